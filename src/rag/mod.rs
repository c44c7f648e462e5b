//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `DocumentLoader`: fetches the knowledge document (HTTP or local file)
//! - `RecursiveChunker`: splits it into overlapping chunks
//! - `VectorIndex`: embeds the chunks and answers top-k similarity queries
//! - `LocalEmbedder`: in-process BERT sentence embeddings

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod local_embedding;

pub use chunker::{ChunkerConfig, RecursiveChunker, TextChunk};
pub use embedding::EmbeddingProvider;
pub use error::RagError;
pub use index::{Retriever, SearchHit, SharedIndex, VectorIndex};
pub use loader::{DocumentKind, DocumentLoader, LoadedDocument};
pub use local_embedding::LocalEmbedder;
