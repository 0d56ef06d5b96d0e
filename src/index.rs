//! Contracts consumed from the external search indices.
//!
//! The engine treats both indices and the chunk store as idempotent,
//! side-effect-free query services built by the ingestion pipeline.
//! Implementations live outside this crate; tests use in-memory mocks.

use async_trait::async_trait;

use crate::error::RagError;
use crate::types::Chunk;

/// A raw hit from a search backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Opaque chunk identifier.
    pub chunk_id: String,
    /// Backend-specific raw score; arbitrary range, normalized by the
    /// retriever before blending.
    pub raw_score: f32,
}

/// Embedding-similarity search over the pre-built vector index.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Returns up to `k` hits for the query, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] when the backend is unreachable or
    /// the query fails.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<IndexHit>, RagError>;
}

/// Lexical (keyword) search over the pre-built keyword index.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Returns up to `k` hits for the query, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] when the backend is unreachable or
    /// the query fails.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<IndexHit>, RagError>;
}

/// Read-only access to chunk content by ID.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetches the chunks for the given IDs.
    ///
    /// IDs with no backing chunk are silently omitted from the result;
    /// the retriever logs and drops the corresponding hits.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] when the store is unreachable.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Chunk>, RagError>;
}
