use thiserror::Error;

use crate::rag::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("document_url is not configured")]
    MissingDocumentUrl,

    #[error("Failed to build knowledge base: {0}")]
    KnowledgeBase(#[from] RagError),

    #[error("Failed to initialize generation service: {0}")]
    Generation(#[source] anyhow::Error),

    #[error("Failed to initialize embedding service: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to read system prompt: {0}")]
    Prompt(#[source] std::io::Error),
}
