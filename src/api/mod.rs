//! HTTP surface: router assembly, CORS, and the health probe.

pub mod chat;
pub mod conversations;
pub mod media;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    let api = Router::new()
        .route("/chat/stream", post(chat::stream))
        .route("/chat", post(chat::complete))
        .route(
            "/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_detail)
                .patch(conversations::rename)
                .delete(conversations::delete),
        )
        .route(
            "/conversations/{id}/messages",
            post(conversations::append_message),
        )
        .route("/image/generate", post(media::generate_image))
        .route(
            "/voice/transcribe",
            post(media::transcribe).layer(DefaultBodyLimit::max(media::UPLOAD_BODY_LIMIT)),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
