//! In-memory vector index.
//!
//! Chunk vectors are L2-normalised into the rows of a dense matrix, so a
//! query's cosine similarity against every chunk is a single matrix-vector
//! product. The index is immutable once built and is shared between
//! concurrent queries through an `Arc` without locking.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use ndarray::{Array1, Array2};
use serde::Serialize;

use super::chunker::TextChunk;
use super::embedding::EmbeddingProvider;
use super::error::RagError;

/// Concurrent embedding requests while building.
const BUILD_CONCURRENCY: usize = 4;

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: TextChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Anything that can return the `k` chunks most similar to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RagError>;
}

pub struct VectorIndex {
    chunks: Arc<Vec<TextChunk>>,
    matrix: Arc<Array2<f32>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    /// Embed every chunk and build the searchable matrix.
    pub async fn build(
        chunks: Vec<TextChunk>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let batch_size = batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();

        let total_batches = batches.len();
        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(i, batch)| {
                let embedder = embedder.clone();
                async move {
                    let vectors = embedder.embed(&batch).await?;
                    if vectors.len() != batch.len() {
                        return Err(RagError::Embedding(format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    tracing::debug!("Embedded batch {}/{}", i + 1, total_batches);
                    Ok(vectors)
                }
            })
            .buffered(BUILD_CONCURRENCY)
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(RagError::Embedding("provider returned empty vectors".to_string()));
        }

        let mut matrix = Array2::<f32>::zeros((vectors.len(), dimension));
        for (row_idx, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(RagError::Embedding(format!(
                    "vector length mismatch at chunk {}: {} != {}",
                    row_idx,
                    vector.len(),
                    dimension
                )));
            }
            ensure_finite(vector, || format!("chunk {}", row_idx))?;
            let mut row = matrix.row_mut(row_idx);
            for (dst, src) in row.iter_mut().zip(normalized(vector)) {
                *dst = src;
            }
        }

        tracing::info!(
            "Built vector index: {} chunks, dimension {}, model {}",
            chunks.len(),
            dimension,
            embedder.model()
        );

        Ok(Self {
            chunks: Arc::new(chunks),
            matrix: Arc::new(matrix),
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model()
    }

    /// Top-`k` chunks by cosine similarity; equal scores keep insertion order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vector for the query".to_string()))?;
        if query_vector.len() != self.dimension() {
            return Err(RagError::Embedding(format!(
                "query vector length mismatch: {} != {}",
                query_vector.len(),
                self.dimension()
            )));
        }
        ensure_finite(&query_vector, || "the query".to_string())?;

        let matrix = self.matrix.clone();
        let chunks = self.chunks.clone();
        tokio::task::spawn_blocking(move || rank(&matrix, &chunks, &query_vector, k))
            .await
            .map_err(RagError::embedding)
    }
}

#[async_trait]
impl Retriever for VectorIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RagError> {
        self.search(query, k).await
    }
}

/// Slot filled exactly once when the startup build finishes.
#[derive(Clone, Default)]
pub struct SharedIndex {
    slot: Arc<OnceLock<Arc<VectorIndex>>>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if an index was already installed.
    pub fn install(&self, index: Arc<VectorIndex>) -> bool {
        self.slot.set(index).is_ok()
    }

    pub fn get(&self) -> Option<&Arc<VectorIndex>> {
        self.slot.get()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}

#[async_trait]
impl Retriever for SharedIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RagError> {
        let index = self.slot.get().ok_or(RagError::EmptyIndex)?;
        index.search(query, k).await
    }
}

fn rank(matrix: &Array2<f32>, chunks: &[TextChunk], query: &[f32], k: usize) -> Vec<SearchHit> {
    let query = Array1::from(normalized(query));
    let scores = matrix.dot(&query);

    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    // stable sort: ties stay in insertion order
    ranked.sort_by(|left, right| right.1.total_cmp(&left.1));

    ranked
        .into_iter()
        .take(k)
        .map(|(idx, score)| SearchHit {
            chunk: chunks[idx].clone(),
            score,
        })
        .collect()
}

/// NaN or infinite components would outrank every real score.
fn ensure_finite(vector: &[f32], what: impl FnOnce() -> String) -> Result<(), RagError> {
    if vector.iter().all(|x| x.is_finite()) {
        return Ok(());
    }
    Err(RagError::Embedding(format!(
        "provider returned a non-finite vector for {}",
        what()
    )))
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words embedder: every lowercase word increments one bucket.
    struct HashingEmbedder {
        dims: usize,
        calls: AtomicUsize,
    }

    impl HashingEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: AtomicUsize::new(0),
            }
        }

        fn vector(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0; self.dims];
            for word in text.split_whitespace() {
                let mut hasher = DefaultHasher::new();
                word.to_lowercase().hash(&mut hasher);
                v[(hasher.finish() % self.dims as u64) as usize] += 1.0;
            }
            v
        }
    }

    #[async_trait]
    impl EmbeddingProvider for HashingEmbedder {
        fn model(&self) -> &str {
            "hashing"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|t| self.vector(t)).collect())
        }
    }

    struct FixedEmbedder(Vec<Vec<f32>>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(self.0.clone())
        }
    }

    /// `"nan"` and `"inf"` embed to non-finite vectors, anything else to a unit vector.
    struct NonFiniteEmbedder;

    #[async_trait]
    impl EmbeddingProvider for NonFiniteEmbedder {
        fn model(&self) -> &str {
            "non-finite"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs
                .iter()
                .map(|t| match t.as_str() {
                    "nan" => vec![f32::NAN, 0.0],
                    "inf" => vec![0.0, f32::INFINITY],
                    _ => vec![1.0, 0.0],
                })
                .collect())
        }
    }

    fn chunk(i: usize, text: &str) -> TextChunk {
        TextChunk {
            chunk_id: format!("doc-{}", i),
            text: text.to_string(),
            source: "doc".to_string(),
            start_offset: i * 100,
            chunk_index: i,
        }
    }

    fn corpus() -> Vec<TextChunk> {
        vec![
            chunk(0, "router power led is red"),
            chunk(1, "reset the controller by holding the button"),
            chunk(2, "replace the fuse in the power supply"),
            chunk(3, "update firmware through the web interface"),
            chunk(4, "the display shows error code e12"),
            chunk(5, "clean the dust filter every month"),
        ]
    }

    async fn build(chunks: Vec<TextChunk>, batch_size: usize) -> VectorIndex {
        VectorIndex::build(chunks, Arc::new(HashingEmbedder::new(256)), batch_size)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_text_ranks_its_chunk_first() {
        let index = build(corpus(), 2).await;
        for original in corpus() {
            let hits = index.search(&original.text, 3).await.unwrap();
            assert_eq!(hits[0].chunk, original);
            assert!(hits[0].score > 0.99);
        }
    }

    #[tokio::test]
    async fn results_are_bounded_and_sorted() {
        let index = build(corpus(), 4).await;
        for k in [1, 3, 6, 10] {
            let hits = index.search("power button red", k).await.unwrap();
            assert!(hits.len() <= k);
            assert_eq!(hits.len(), k.min(index.len()));
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[tokio::test]
    async fn zero_k_returns_nothing() {
        let index = build(corpus(), 8).await;
        assert!(index.search("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let chunks = vec![
            chunk(0, "alpha"),
            chunk(1, "same text"),
            chunk(2, "same text"),
            chunk(3, "same text"),
        ];
        let index = build(chunks, 1).await;
        let hits = index.search("same text", 3).await.unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn chunk_text_is_kept_as_payload() {
        let index = build(corpus(), 3).await;
        let hits = index.search("firmware web interface", 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "update firmware through the web interface");
        assert_eq!(hits[0].chunk.start_offset, 300);
    }

    #[tokio::test]
    async fn build_batches_requests() {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let index = VectorIndex::build(corpus(), embedder.clone(), 4).await.unwrap();
        assert_eq!(index.len(), 6);
        assert_eq!(index.dimension(), 64);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_chunk_list_is_rejected() {
        let result = VectorIndex::build(Vec::new(), Arc::new(HashingEmbedder::new(8)), 4).await;
        assert!(matches!(result, Err(RagError::EmptyIndex)));
    }

    #[tokio::test]
    async fn inconsistent_dimensions_are_rejected() {
        let embedder = Arc::new(FixedEmbedder(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]));
        let result = VectorIndex::build(vec![chunk(0, "a"), chunk(1, "b")], embedder, 8).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn wrong_vector_count_is_rejected() {
        let embedder = Arc::new(FixedEmbedder(vec![vec![1.0, 0.0]]));
        let result = VectorIndex::build(vec![chunk(0, "a"), chunk(1, "b")], embedder, 8).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn non_finite_chunk_vectors_are_rejected() {
        for bad in ["nan", "inf"] {
            let chunks = vec![chunk(0, "fine"), chunk(1, bad)];
            let err = VectorIndex::build(chunks, Arc::new(NonFiniteEmbedder), 8)
                .await
                .err()
                .unwrap();
            assert!(matches!(&err, RagError::Embedding(msg) if msg.contains("chunk 1")));
        }
    }

    #[tokio::test]
    async fn non_finite_query_vector_is_rejected() {
        let index = VectorIndex::build(vec![chunk(0, "fine")], Arc::new(NonFiniteEmbedder), 8)
            .await
            .unwrap();
        let err = index.search("nan", 1).await.unwrap_err();
        assert!(matches!(&err, RagError::Embedding(msg) if msg.contains("query")));
        assert_eq!(index.search("fine", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shared_index_rejects_search_before_install() {
        let shared = SharedIndex::new();
        assert!(!shared.is_ready());
        let err = shared.retrieve("hello", 4).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));

        assert!(shared.install(Arc::new(build(corpus(), 2).await)));
        assert!(!shared.install(Arc::new(build(corpus(), 2).await)));
        let hits = shared.retrieve("clean the dust filter every month", 4).await.unwrap();
        assert_eq!(hits[0].chunk.chunk_index, 5);
    }

    #[test]
    fn zero_vectors_score_zero() {
        let matrix = Array2::from_shape_vec((2, 2), vec![0.0, 0.0, 1.0, 0.0]).unwrap();
        let chunks = vec![chunk(0, "zero"), chunk(1, "x")];
        let hits = rank(&matrix, &chunks, &[1.0, 0.0], 2);
        assert_eq!(hits[0].chunk.chunk_index, 1);
        assert_eq!(hits[1].score, 0.0);
    }
}
