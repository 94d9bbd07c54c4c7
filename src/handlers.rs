use crate::config::Config;
use crate::conversation_store::ConversationStore;
use crate::dialog::{ConsentForm, IntakeDialog, Phase, Submission};
use crate::errors::{AppError, ResultExt};
use crate::llm_client::CompletionClient;
use crate::models::*;
use crate::recommendation::{outage_fallback, RecommendationService};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const START_CHAT_FAILED_MESSAGE: &str = "Error starting chat. Please try again.";

const UNKNOWN_IP: &str = "0.0.0.0";

type Session = Arc<Mutex<IntakeDialog>>;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Turns a finished profile into a card recommendation.
    pub recommender: RecommendationService,
    /// Where consent and outcome records are written.
    pub store: Arc<dyn ConversationStore>,
    /// Live intake sessions, dropped after `session_ttl_secs` of inactivity.
    pub sessions: Cache<Uuid, Session>,
}

impl AppState {
    pub fn new(
        config: Config,
        completion_client: Arc<dyn CompletionClient>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(Duration::from_secs(config.session_ttl_secs))
            .max_capacity(10_000)
            .build();

        Self {
            config,
            recommender: RecommendationService::new(completion_client),
            store,
            sessions,
        }
    }

    async fn session(&self, id: Uuid) -> Result<Session, AppError> {
        self.sessions
            .get(&id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("intake session {} not found", id)))
    }
}

/// Snapshot of an intake session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub dialog: IntakeDialog,
}

/// Bot output produced by one consent or chat submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub phase: Phase,
    /// Messages appended to the transcript by this submission.
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    /// False when the final record could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_saved: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRequest {
    pub text: String,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "card-advisor-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/recommend
///
/// Always answers `success: true`. Malformed bodies and upstream failures
/// both produce the fallback recommendation.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Json<RecommendResponse> {
    let recommendation = match payload {
        Ok(Json(request)) => {
            tracing::info!(
                "POST /api/recommend - {} of 7 fields answered",
                request.conversation_data.answered()
            );
            state
                .recommender
                .recommend(&request.user_name, &request.conversation_data)
                .await
        }
        Err(rejection) => {
            tracing::warn!("POST /api/recommend - unreadable body: {}", rejection);
            outage_fallback()
        }
    };

    Json(RecommendResponse {
        success: true,
        recommendation,
    })
}

/// POST /api/v1/intake
///
/// Opens a new session on the landing phase.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SessionView>) {
    let session_id = Uuid::new_v4();
    let dialog = IntakeDialog::new();
    state
        .sessions
        .insert(session_id, Arc::new(Mutex::new(dialog.clone())))
        .await;

    tracing::info!("Intake session {} created", session_id);
    (StatusCode::CREATED, Json(SessionView { session_id, dialog }))
}

/// GET /api/v1/intake/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(id).await?;
    let dialog = session.lock().await.clone();
    Ok(Json(SessionView {
        session_id: id,
        dialog,
    }))
}

/// POST /api/v1/intake/:id/start
///
/// Landing -> consent.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.session(id).await?;
    let mut dialog = session.lock().await;
    dialog.start()?;

    Ok(Json(SessionView {
        session_id: id,
        dialog: dialog.clone(),
    }))
}

/// POST /api/v1/intake/:id/consent
///
/// Validates the consent form and stores the initial record. The chat only
/// opens once that insert succeeded.
pub async fn submit_consent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(form): Json<ConsentForm>,
) -> Result<Json<ChatReply>, AppError> {
    let session = state.session(id).await?;
    let mut dialog = session.lock().await;

    if dialog.phase() != Phase::Consent {
        return Err(AppError::Conflict(format!(
            "consent is not expected in phase {:?}",
            dialog.phase()
        )));
    }

    let identity = form.validate()?;
    let user_ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let record = ConversationRecord::at_consent(&identity.name, &identity.email, &user_ip);
    if let Err(e) = state.store.insert(&record).await {
        tracing::error!("Error saving user data: {}", e);
        return Err(AppError::Unavailable(START_CHAT_FAILED_MESSAGE.to_string()));
    }

    tracing::info!("Session {}: consent recorded for {}", id, identity.email);
    let messages = dialog.enter_chat(identity)?.to_vec();

    Ok(Json(ChatReply {
        phase: dialog.phase(),
        messages,
        recommendation: None,
        record_saved: Some(true),
    }))
}

/// POST /api/v1/intake/:id/messages
///
/// Records one answer. The final answer triggers the recommendation request
/// and the record update, then closes the session with the thank-you phase.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let session = state.session(id).await?;

    // Runs on its own task: a client that disconnects mid-recommendation must
    // not leave the session answered but never finished.
    tokio::spawn(advance_session(state, id, session, request.text))
        .await
        .map_err(|e| AppError::InternalError(format!("session {} task failed: {}", id, e)))?
        .map(Json)
}

async fn advance_session(
    state: Arc<AppState>,
    id: Uuid,
    session: Session,
    text: String,
) -> Result<ChatReply, AppError> {
    let mut dialog = session.lock().await;
    let before = dialog.transcript().len();

    let step = dialog
        .submit(&text)
        .with_context(|| format!("session {}", id))?;

    let (recommendation, record_saved) = match step {
        Submission::Ignored | Submission::Next(_) => (None, None),
        Submission::Complete(profile) => {
            let (name, email) = dialog
                .user()
                .map(|u| (u.name.clone(), u.email.clone()))
                .ok_or_else(|| AppError::InternalError("chat without a user".to_string()))?;

            let recommendation = state.recommender.recommend(&name, &profile).await;
            let saved = finalize_record(state.store.as_ref(), &email, &profile, &recommendation).await;

            dialog.finish()?;
            (Some(recommendation), Some(saved))
        }
    };

    Ok(ChatReply {
        phase: dialog.phase(),
        messages: dialog.transcript()[before..].to_vec(),
        recommendation,
        record_saved,
    })
}

/// Writes the final profile and recommendation. A failure here does not stop
/// the session from finishing; it is logged and reported back as `false`.
pub async fn finalize_record(
    store: &dyn ConversationStore,
    email: &str,
    profile: &Profile,
    recommendation: &Recommendation,
) -> bool {
    match store.update_by_email(email, profile, recommendation).await {
        Ok(()) => {
            tracing::info!(
                "Recommendation for {}: {} ({})",
                email,
                recommendation.card_name,
                recommendation.apply_url
            );
            true
        }
        Err(e) => {
            tracing::error!("Error saving recommendation for {}: {}", email, e);
            false
        }
    }
}

/// Best-effort client address: proxy headers first, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, None), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_then_placeholder() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.4:5555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.4");
        assert_eq!(client_ip(&headers, None), UNKNOWN_IP);
    }
}
