pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod directive;
pub mod error;
pub mod image;
pub mod logging;
pub mod providers;
pub mod voice;

use std::sync::Arc;

use crate::config::Settings;
use crate::db::DbPool;
use crate::error::AppError;
use crate::image::ImageClient;
use crate::providers::ProviderRegistry;
use crate::voice::VoiceClient;

/// Shared per-request context. Everything here is constructed once at
/// startup and immutable afterwards; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub providers: Arc<ProviderRegistry>,
    pub image: Arc<ImageClient>,
    pub voice: Arc<VoiceClient>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings, db: DbPool) -> Self {
        Self {
            providers: Arc::new(ProviderRegistry::new(&settings)),
            image: Arc::new(ImageClient::new(settings.huggingface_api_key.clone())),
            voice: Arc::new(VoiceClient::new(settings.groq_api_key.clone())),
            settings: Arc::new(settings),
            db,
        }
    }
}

/// Start the gateway: load config, open the database, bind, and serve until
/// ctrl-c.
pub async fn run() -> Result<(), AppError> {
    // A missing .env file is fine; the environment may be set directly.
    let _ = dotenvy::dotenv();
    logging::init();

    let settings = Settings::from_env()?;
    let db = db::init_db(&settings.data_dir)?;

    let bind_addr = settings.bind_addr;
    let state = AppState::new(settings, db);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install ctrl-c handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
