use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{health, messages};
use crate::state::AppState;

/// HTTP surface mirroring the chat entry points, plus health and status.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/start", get(messages::start))
        .route("/api/help", get(messages::help))
        .route("/api/messages", post(messages::post_message))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
