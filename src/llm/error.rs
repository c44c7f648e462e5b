use thiserror::Error;

/// Longest provider error body carried into a user-visible message.
const MAX_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation service rejected the credentials (HTTP {0})")]
    Auth(u16),

    #[error("generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation service returned an empty answer")]
    EmptyResponse,

    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

impl GenerationError {
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        GenerationError::Unavailable(err.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        let body: String = body.trim().chars().take(MAX_BODY_CHARS).collect();
        GenerationError::Status { status, body }
    }
}
