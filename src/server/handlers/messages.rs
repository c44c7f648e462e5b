use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::pipeline::{strip_footer, IncomingMessage};
use crate::state::AppState;

pub async fn start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "response": state.bot.on_start() }))
}

pub async fn help(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "response": state.bot.on_help() }))
}

/// Same routing as a chat message: `/start` and `/help` are answered
/// directly, anything else goes through the pipeline.
///
/// `response` is the text a chat user would see; `answer` drops the footer.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IncomingMessage>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(message) = payload?;

    let response = state.bot.dispatch(&message).await;
    let answer = strip_footer(&response);
    Ok(Json(json!({ "response": response, "answer": answer })))
}
