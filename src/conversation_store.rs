use crate::config::StoreSettings;
use crate::db::Database;
use crate::errors::{AppError, ResultExt};
use crate::models::{ConversationRecord, Profile, Recommendation};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const TABLE: &str = "user_conversations";

/// Write side of the `user_conversations` table.
///
/// Records are keyed by email: inserting again for a known email replaces the
/// earlier row instead of adding a second one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Stores the record written at consent time.
    async fn insert(&self, record: &ConversationRecord) -> Result<(), AppError>;

    /// Attaches the final profile and recommendation to the record for `email`.
    async fn update_by_email(
        &self,
        email: &str,
        profile: &Profile,
        recommendation: &Recommendation,
    ) -> Result<(), AppError>;
}

/// Builds the store selected by `settings`.
pub async fn connect(settings: &StoreSettings) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let store: Arc<dyn ConversationStore> = match settings {
        StoreSettings::Rest { url, key } => {
            tracing::info!("Conversation store: REST endpoint {}", url);
            Arc::new(RestConversationStore::new(url.clone(), key.clone()))
        }
        StoreSettings::Postgres { database_url } => {
            let db = Database::new(database_url).await?;
            db.ensure_schema().await?;
            tracing::info!("Conversation store: Postgres connection pool established");
            Arc::new(PgConversationStore::new(db.pool))
        }
        StoreSettings::Memory => Arc::new(MemoryConversationStore::default()),
        StoreSettings::Unconfigured => Arc::new(UnconfiguredStore),
    };
    Ok(store)
}

// ============ PostgREST ============

/// Hosted table behind a PostgREST endpoint (`{url}/rest/v1/...`).
#[derive(Clone)]
pub struct RestConversationStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestConversationStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, params: &[(&str, &str)]) -> Result<reqwest::Url, AppError> {
        reqwest::Url::parse_with_params(&format!("{}/rest/v1/{}", self.base_url, TABLE), params)
            .map_err(|e| AppError::InternalError(format!("Failed to build store URL: {}", e)))
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(AppError::ExternalApiError(format!(
            "Store {} failed {}: {}",
            action, status, error_text
        )))
    }
}

#[async_trait]
impl ConversationStore for RestConversationStore {
    async fn insert(&self, record: &ConversationRecord) -> Result<(), AppError> {
        let url = self.table_url(&[("on_conflict", "user_email")])?;
        tracing::info!("Saving consent record for {}", record.user_email);

        // Nulls are explicit so that an upsert clears an earlier recommendation.
        let body = json!({
            "user_name": record.user_name,
            "user_email": record.user_email,
            "user_ip": record.user_ip,
            "consent_given": record.consent_given,
            "conversation_data": record.conversation_data,
            "recommended_card_name": record.recommended_card_name,
            "recommendation_reason": record.recommendation_reason,
        });

        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Store request failed: {}", e)))?;

        Self::check(response, "insert").await?;
        Ok(())
    }

    async fn update_by_email(
        &self,
        email: &str,
        profile: &Profile,
        recommendation: &Recommendation,
    ) -> Result<(), AppError> {
        let filter = format!("eq.{}", email);
        let url = self.table_url(&[("user_email", filter.as_str())])?;

        let body = json!({
            "conversation_data": profile,
            "recommended_card_name": recommendation.card_name,
            "recommendation_reason": recommendation.reason,
        });

        let response = self
            .client
            .patch(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Store request failed: {}", e)))?;

        let rows: Value = Self::check(response, "update")
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to parse store response: {}", e))
            })?;

        if rows.as_array().map(|r| r.is_empty()).unwrap_or(false) {
            return Err(AppError::NotFound(format!(
                "no conversation record for {}",
                email
            )));
        }

        tracing::info!("✓ Recommendation saved for {}", email);
        Ok(())
    }
}

// ============ Postgres ============

/// Direct Postgres access to the table.
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn insert(&self, record: &ConversationRecord) -> Result<(), AppError> {
        tracing::info!("Saving consent record for {}", record.user_email);

        sqlx::query(
            r#"
            INSERT INTO user_conversations
                (user_name, user_email, user_ip, consent_given, conversation_data,
                 recommended_card_name, recommendation_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_email) DO UPDATE SET
                user_name = EXCLUDED.user_name,
                user_ip = EXCLUDED.user_ip,
                consent_given = EXCLUDED.consent_given,
                conversation_data = EXCLUDED.conversation_data,
                recommended_card_name = EXCLUDED.recommended_card_name,
                recommendation_reason = EXCLUDED.recommendation_reason
            "#,
        )
        .bind(&record.user_name)
        .bind(&record.user_email)
        .bind(&record.user_ip)
        .bind(record.consent_given)
        .bind(Json(&record.conversation_data))
        .bind(&record.recommended_card_name)
        .bind(&record.recommendation_reason)
        .execute(&self.pool)
        .await
        .context("inserting conversation record")?;

        Ok(())
    }

    async fn update_by_email(
        &self,
        email: &str,
        profile: &Profile,
        recommendation: &Recommendation,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_conversations
            SET conversation_data = $2,
                recommended_card_name = $3,
                recommendation_reason = $4
            WHERE user_email = $1
            "#,
        )
        .bind(email)
        .bind(Json(profile))
        .bind(&recommendation.card_name)
        .bind(&recommendation.reason)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating conversation record for {}", email))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no conversation record for {}",
                email
            )));
        }

        tracing::info!("✓ Recommendation saved for {}", email);
        Ok(())
    }
}

// ============ In-memory ============

/// Process-local store keyed by email.
#[derive(Default)]
pub struct MemoryConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
}

impl MemoryConversationStore {
    pub async fn get(&self, email: &str) -> Option<ConversationRecord> {
        self.records.read().await.get(email).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn insert(&self, record: &ConversationRecord) -> Result<(), AppError> {
        let mut records = self.records.write().await;

        // An upsert keeps the row's original creation time.
        let created_at = records
            .get(&record.user_email)
            .and_then(|existing| existing.created_at)
            .or(record.created_at)
            .unwrap_or_else(Utc::now);

        let mut stored = record.clone();
        stored.created_at = Some(created_at);
        records.insert(record.user_email.clone(), stored);
        Ok(())
    }

    async fn update_by_email(
        &self,
        email: &str,
        profile: &Profile,
        recommendation: &Recommendation,
    ) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(email)
            .ok_or_else(|| AppError::NotFound(format!("no conversation record for {}", email)))?;

        record.conversation_data = profile.clone();
        record.recommended_card_name = Some(recommendation.card_name.clone());
        record.recommendation_reason = Some(recommendation.reason.clone());
        Ok(())
    }
}

// ============ Unconfigured ============

/// Stand-in used when no store settings were provided.
pub struct UnconfiguredStore;

impl UnconfiguredStore {
    fn error() -> AppError {
        AppError::InternalError("conversation store is not configured".to_string())
    }
}

#[async_trait]
impl ConversationStore for UnconfiguredStore {
    async fn insert(&self, _record: &ConversationRecord) -> Result<(), AppError> {
        Err(Self::error())
    }

    async fn update_by_email(
        &self,
        _email: &str,
        _profile: &Profile,
        _recommendation: &Recommendation,
    ) -> Result<(), AppError> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::outage_fallback;

    #[tokio::test]
    async fn memory_store_upserts_by_email() {
        let store = MemoryConversationStore::default();
        store
            .insert(&ConversationRecord::at_consent("Ana", "ana@example.com", "10.0.0.1"))
            .await
            .unwrap();
        let first_created = store.get("ana@example.com").await.unwrap().created_at;
        assert!(first_created.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .insert(&ConversationRecord::at_consent("Ana B", "ana@example.com", "10.0.0.2"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let record = store.get("ana@example.com").await.unwrap();
        assert_eq!(record.user_name, "Ana B");
        assert_eq!(record.user_ip, "10.0.0.2");
        assert_eq!(record.created_at, first_created);
    }

    #[tokio::test]
    async fn memory_store_update_needs_a_record() {
        let store = MemoryConversationStore::default();
        let err = store
            .update_by_email("nobody@example.com", &Profile::default(), &outage_fallback())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn unconfigured_store_fails_on_use() {
        let store = UnconfiguredStore;
        assert!(store
            .insert(&ConversationRecord::at_consent("Ana", "ana@example.com", "0.0.0.0"))
            .await
            .is_err());
    }
}
