use axum::extract::rejection::JsonRejection;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP API. Pipeline failures are not errors here:
/// they are answered with a user-visible reply like any chat transport does.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidMessage(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_message_is_a_bad_request() {
        assert_eq!(
            ApiError::InvalidMessage("missing field `text`".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn message_carries_the_reason() {
        let err = ApiError::InvalidMessage("missing field `text`".to_string());
        assert_eq!(err.to_string(), "invalid message: missing field `text`");
    }
}
