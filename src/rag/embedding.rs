use async_trait::async_trait;

use super::error::RagError;

/// Maps text to fixed-dimensionality vectors.
///
/// The same provider must be used to build an index and to query it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// model identifier, used in logs and the status endpoint
    fn model(&self) -> &str;

    /// embed a batch of inputs, one vector per input in the same order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}
