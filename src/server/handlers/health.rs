use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": state.index.is_ready(),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index = state.index.get();
    let generator = state.pipeline.generator();

    Json(json!({
        "initialized": index.is_some(),
        "document_url": state.config.document_url,
        "chunks": index.map(|i| i.len()).unwrap_or(0),
        "embedding_dimension": index.map(|i| i.dimension()).unwrap_or(0),
        "embedding_model": index.map(|i| i.embedding_model().to_string()),
        "generation_provider": generator.provider().name(),
        "generation_model": generator.provider().model(),
        "top_k": state.pipeline.top_k(),
        "token_cost": generator.token_cost(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
