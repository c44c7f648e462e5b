use async_trait::async_trait;

use super::error::GenerationError;
use super::types::ChatRequest;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// return the provider name (e.g. "openai-compatible")
    fn name(&self) -> &str;

    /// model identifier sent with every request
    fn model(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, GenerationError>;
}
