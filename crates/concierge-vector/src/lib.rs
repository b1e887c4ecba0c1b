//! Concierge Vector crate - embedding capability and similarity store.
//!
//! Provides the embedding service trait with an HTTP client and a
//! deterministic mock, and the vector store trait with an in-memory
//! cosine index supporting metadata-equality filters.

pub mod embedding;
pub mod index;

pub use embedding::{DynEmbeddingService, EmbeddingService, HttpEmbeddingService, MockEmbedding};
pub use index::{MetadataFilter, VectorIndex, VectorMatch, VectorStore};
