//! Profile -> prompt -> one completion -> [`Recommendation`].
//!
//! Every failure path ends in the fallback card; callers never see an error.

use crate::errors::AppError;
use crate::llm_client::CompletionClient;
use crate::models::{Profile, ProfileField, Recommendation};
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub const FALLBACK_CARD_NAME: &str = "Rogers World Elite Mastercard";
pub const FALLBACK_ISSUER: &str = "Rogers Bank";
pub const FALLBACK_APPLY_URL: &str =
    "https://www.rogersbank.com/en/rogers_credit_cards/rogers_world_elite_mastercard";
pub const FALLBACK_REASON: &str = "Based on your profile, this card offers excellent value with 1.5% cashback on all purchases, 4% on Rogers/Fido bills, and no annual fee.";

/// Characters of an unparseable reply kept as the fallback reason.
pub const REASON_EXCERPT_CHARS: usize = 300;

const NOT_SPECIFIED: &str = "Not specified";

/// Fallback used when the service could not be reached or refused the request.
pub fn outage_fallback() -> Recommendation {
    Recommendation {
        card_name: FALLBACK_CARD_NAME.to_string(),
        issuer: FALLBACK_ISSUER.to_string(),
        reason: FALLBACK_REASON.to_string(),
        key_benefits: vec![
            "1.5% cashback on all purchases".to_string(),
            "4% cashback on Rogers/Fido bills".to_string(),
            "No annual fee".to_string(),
            "Comprehensive travel insurance".to_string(),
        ],
        apply_url: FALLBACK_APPLY_URL.to_string(),
    }
}

/// Fallback used when the service answered but not with the expected JSON.
/// The start of the reply is kept as the reason.
pub fn unparsed_fallback(reply: &str) -> Recommendation {
    let excerpt: String = reply.trim().chars().take(REASON_EXCERPT_CHARS).collect();
    Recommendation {
        card_name: FALLBACK_CARD_NAME.to_string(),
        issuer: FALLBACK_ISSUER.to_string(),
        reason: if excerpt.is_empty() {
            FALLBACK_REASON.to_string()
        } else {
            excerpt
        },
        key_benefits: vec![
            "1.5% cashback on all purchases".to_string(),
            "4% on Rogers/Fido bills".to_string(),
            "No annual fee".to_string(),
        ],
        apply_url: FALLBACK_APPLY_URL.to_string(),
    }
}

/// Builds the advisor prompt. Missing answers (and a blank name) read as
/// "Not specified".
pub fn build_prompt(user_name: &str, profile: &Profile) -> String {
    let name = if user_name.trim().is_empty() {
        NOT_SPECIFIED
    } else {
        user_name.trim()
    };

    let mut lines = String::new();
    for field in ProfileField::ALL {
        let value = profile
            .get(field)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(NOT_SPECIFIED);
        lines.push_str(&format!("- {}: {}\n", field.label(), value));
    }

    format!(
        r#"You are Sai, an expert credit card advisor. Analyze this user's profile and recommend the BEST Canadian credit card for them.

User Profile:
- Name: {name}
{lines}
Based on this profile, recommend ONE credit card that's the best match. Provide:
1. Card name and issuer
2. Brief reason why it's perfect for them (2-3 sentences)
3. Key benefits that match their needs
4. Application URL (if you know it, otherwise use a placeholder)

Format your response as JSON:
{{
  "cardName": "Card Name",
  "issuer": "Bank Name",
  "reason": "Why this card is perfect...",
  "keyBenefits": ["Benefit 1", "Benefit 2", "Benefit 3"],
  "applyUrl": "https://..."
}}"#
    )
}

/// Removes markdown code-fence markers anywhere in `reply` and trims.
pub fn strip_code_fences(reply: &str) -> String {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE_RE.get_or_init(|| Regex::new(r"```(?:json)?\n?").expect("fence regex is valid"));
    re.replace_all(reply, "").trim().to_string()
}

/// Parses a model reply into a [`Recommendation`], after stripping code fences.
pub fn parse_recommendation(reply: &str) -> Result<Recommendation, AppError> {
    let cleaned = strip_code_fences(reply);
    serde_json::from_str(&cleaned).map_err(|e| {
        AppError::ExternalApiError(format!("LLM reply is not a recommendation: {}", e))
    })
}

/// Requests card recommendations from a [`CompletionClient`].
#[derive(Clone)]
pub struct RecommendationService {
    client: Arc<dyn CompletionClient>,
}

impl RecommendationService {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Returns a recommendation for `profile`. Never fails: transport errors
    /// and unparseable replies both yield the fallback card.
    pub async fn recommend(&self, user_name: &str, profile: &Profile) -> Recommendation {
        let prompt = build_prompt(user_name, profile);

        let reply = match self.client.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Recommendation request failed, using fallback card: {}", e);
                return outage_fallback();
            }
        };

        match parse_recommendation(&reply) {
            Ok(recommendation) => {
                tracing::info!(
                    "Recommended {} ({})",
                    recommendation.card_name,
                    recommendation.issuer
                );
                recommendation
            }
            Err(e) => {
                tracing::warn!("{}; using fallback card", e);
                unparsed_fallback(&reply)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned(Result<String, String>);

    #[async_trait]
    impl CompletionClient for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, AppError> {
            self.0.clone().map_err(AppError::ExternalApiError)
        }
    }

    fn service(reply: Result<&str, &str>) -> RecommendationService {
        RecommendationService::new(Arc::new(Canned(
            reply.map(str::to_string).map_err(str::to_string),
        )))
    }

    const VALID: &str = r#"{"cardName":"Tangerine Money-Back","issuer":"Tangerine","reason":"Groceries.","keyBenefits":["2% groceries"],"applyUrl":"https://tangerine.ca"}"#;

    #[test]
    fn fences_are_removed() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn fenced_json_parses_into_exact_shape() {
        let reply = format!("```json\n{}\n```", VALID);
        let rec = parse_recommendation(&reply).unwrap();
        assert_eq!(
            rec,
            Recommendation {
                card_name: "Tangerine Money-Back".to_string(),
                issuer: "Tangerine".to_string(),
                reason: "Groceries.".to_string(),
                key_benefits: vec!["2% groceries".to_string()],
                apply_url: "https://tangerine.ca".to_string(),
            }
        );
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(parse_recommendation(r#"{"card":"x"}"#).is_err());
        assert!(parse_recommendation("I recommend the Amex Cobalt.").is_err());
    }

    #[test]
    fn prompt_embeds_every_field() {
        let mut profile = Profile::default();
        profile.set(ProfileField::SpendingCategory, "groceries");
        let prompt = build_prompt("Ana", &profile);

        assert!(prompt.contains("- Name: Ana"));
        assert!(prompt.contains("- Primary Spending: groceries"));
        assert!(prompt.contains("- Card Interest: Not specified"));
        assert!(prompt.contains("- Bonus Importance: Not specified"));
        assert!(prompt.contains("\"keyBenefits\""));
    }

    #[test]
    fn excerpt_is_capped_on_char_boundaries() {
        let reply = "é".repeat(REASON_EXCERPT_CHARS + 50);
        let rec = unparsed_fallback(&reply);
        assert_eq!(rec.reason.chars().count(), REASON_EXCERPT_CHARS);
        assert_eq!(rec.card_name, FALLBACK_CARD_NAME);
    }

    #[tokio::test]
    async fn valid_reply_is_returned() {
        let rec = service(Ok(VALID)).recommend("Ana", &Profile::default()).await;
        assert_eq!(rec.card_name, "Tangerine Money-Back");
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        let rec = service(Ok("Sure! The best card is...")).recommend("Ana", &Profile::default()).await;
        assert_eq!(rec.card_name, FALLBACK_CARD_NAME);
        assert_eq!(rec.reason, "Sure! The best card is...");
        assert_eq!(rec.key_benefits.len(), 3);
    }

    #[tokio::test]
    async fn blank_reply_uses_the_default_reason() {
        for reply in ["", "   \n\t "] {
            let rec = service(Ok(reply)).recommend("Ana", &Profile::default()).await;
            assert_eq!(rec.card_name, FALLBACK_CARD_NAME);
            assert_eq!(rec.reason, FALLBACK_REASON);
            assert_eq!(rec.key_benefits.len(), 3);
        }
    }

    #[tokio::test]
    async fn outage_falls_back() {
        let rec = service(Err("connection refused")).recommend("Ana", &Profile::default()).await;
        assert_eq!(rec, outage_fallback());
    }
}
