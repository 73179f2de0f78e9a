use std::sync::Arc;

use axum::http::HeaderValue;
use estoinbox::{backend::SqliteBackend, chat::AdminChat, chatbot, config::Config, AppState};
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_minutes)));

    let backend = Arc::new(
        SqliteBackend::connect(
            &config.database_url,
            config.push_capacity,
            &config.admin_email,
            &config.admin_password,
        )
        .await?,
    );

    let chat = Arc::new(AdminChat::new(backend.clone()));
    if let Err(err) = chat.start().await {
        // shown inline on the dashboard, retried from there
        tracing::warn!("initial inbox load failed: {err}");
    }

    let app_state = AppState {
        backend,
        chat: chat.clone(),
        catalog: Arc::new(chatbot::default_catalog()),
    };

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(origin.parse::<HeaderValue>()?),
        None => CorsLayer::new().allow_origin(Any),
    };

    let app = estoinbox::router(app_state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("estoinbox v{} listening on http://{}", env!("CARGO_PKG_VERSION"), config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    chat.shutdown().await;
    Ok(())
}
