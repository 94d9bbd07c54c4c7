use crate::config::Config;
use crate::errors::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text-generation backend that answers a single user prompt.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends `prompt` as one user message and returns the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Creates a new `AnthropicClient`.
    ///
    /// An empty `api_key` is accepted; requests will then be rejected by the
    /// service and callers fall back accordingly.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.anthropic_base_url.clone(),
            config.anthropic_api_key.clone(),
            config.model.clone(),
            config.max_tokens,
        )
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/messages", self.base_url);
        tracing::info!(
            "Requesting completion from {} (model={}, prompt_chars={})",
            url,
            self.model,
            prompt.chars().count()
        );

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "LLM service returned {}: {}",
                status, error_text
            )));
        }

        let data: MessagesResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse LLM response: {}", e))
        })?;

        // Only a leading text block counts as the reply.
        let text = match data.content.into_iter().next() {
            Some(ContentBlock::Text { text }) => text,
            _ => String::new(),
        };

        tracing::debug!("LLM reply received ({} chars)", text.chars().count());
        Ok(text)
    }
}
