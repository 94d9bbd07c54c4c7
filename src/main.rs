use card_advisor_api::config::Config;
use card_advisor_api::handlers::AppState;
use card_advisor_api::llm_client::AnthropicClient;
use card_advisor_api::{api, conversation_store, obs};
use std::net::SocketAddr;
use std::sync::Arc;

/// Starts the intake API.
///
/// Missing credentials are logged by `Config::from_env` and do not stop the
/// server; the affected calls fail (or fall back) when they are made.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing("card_advisor_api=debug,tower_http=debug");

    let config = Config::from_env()?;

    let completion_client = Arc::new(AnthropicClient::from_config(&config));
    tracing::info!("LLM client initialized: {}", config.anthropic_base_url);

    let store = conversation_store::connect(&config.store).await?;

    let port = config.port;
    let app_state = Arc::new(AppState::new(config, completion_client, store));
    let app = api::router(app_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
