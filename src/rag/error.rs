use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Failed to load document from {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("Document is empty: {0}")]
    EmptyDocument(String),

    #[error("Vector index is empty or has not been built")]
    EmptyIndex,

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Failed to load embedding model: {0}")]
    Model(String),
}

impl RagError {
    pub fn load<E: std::fmt::Display>(url: &str, err: E) -> Self {
        RagError::Load {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }
}
