//! UXR voice relay server library logic.

pub mod api_stream;
pub mod api_summarise;
pub mod api_voice;
pub mod config;
pub mod error;
pub mod relay;
pub mod upstream;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use config::{Config, Credentials};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded server configuration.
    pub config: Arc<Config>,
    /// Upstream credentials from the environment.
    pub credentials: Credentials,
    /// Shared client for the REST upstreams.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, credentials: Credentials) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            http: reqwest::Client::new(),
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/voice/elevenlabs/stream",
            get(api_stream::stream_handler),
        )
        .route("/api/voice/elevenlabs/tts", post(api_voice::tts_handler))
        .route("/api/voice/elevenlabs/stt", post(api_voice::stt_handler))
        .route("/api/summarise", post(api_summarise::summarise_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
