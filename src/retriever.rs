//! Hybrid retrieval: concurrent semantic + keyword search with score blending.
//!
//! Both sub-queries run in parallel, each under its own timeout. A failed
//! backend degrades the search to the surviving backend's results alone;
//! the whole call fails only when both backends fail. Raw backend scores
//! arrive in arbitrary ranges and are min-max normalized per result set
//! before blending.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{RagConfig, validate_weights};
use crate::error::RagError;
use crate::index::{ChunkStore, IndexHit, KeywordIndex, SemanticIndex};
use crate::types::{RetrievalResult, ScoredChunk};

/// Validated blend weight pair. Weights always sum to 1.0; the invariant
/// is enforced at construction, never re-checked at query time.
#[derive(Debug, Clone, Copy)]
pub struct BlendWeights {
    semantic: f32,
    keyword: f32,
}

impl BlendWeights {
    /// Creates a weight pair, enforcing the sum-to-1.0 invariant.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when either weight is outside `[0, 1]`
    /// or the pair does not sum to 1.0.
    pub fn new(semantic: f32, keyword: f32) -> Result<Self, RagError> {
        validate_weights(semantic, keyword)?;
        Ok(Self { semantic, keyword })
    }

    /// Semantic weight.
    #[must_use]
    pub const fn semantic(self) -> f32 {
        self.semantic
    }

    /// Keyword weight.
    #[must_use]
    pub const fn keyword(self) -> f32 {
        self.keyword
    }
}

/// Hybrid search over the pre-built semantic and keyword indices.
pub struct HybridRetriever {
    semantic: Arc<dyn SemanticIndex>,
    keyword: Arc<dyn KeywordIndex>,
    store: Arc<dyn ChunkStore>,
    weights: BlendWeights,
    search_timeout: Duration,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("weights", &self.weights)
            .field("search_timeout", &self.search_timeout)
            .finish_non_exhaustive()
    }
}

impl HybridRetriever {
    /// Creates a retriever with explicit weights and per-backend timeout.
    #[must_use]
    pub fn new(
        semantic: Arc<dyn SemanticIndex>,
        keyword: Arc<dyn KeywordIndex>,
        store: Arc<dyn ChunkStore>,
        weights: BlendWeights,
        search_timeout: Duration,
    ) -> Self {
        Self {
            semantic,
            keyword,
            store,
            weights,
            search_timeout,
        }
    }

    /// Creates a retriever from engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the configured weights are invalid.
    pub fn from_config(
        semantic: Arc<dyn SemanticIndex>,
        keyword: Arc<dyn KeywordIndex>,
        store: Arc<dyn ChunkStore>,
        config: &RagConfig,
    ) -> Result<Self, RagError> {
        let weights = BlendWeights::new(config.semantic_weight, config.keyword_weight)?;
        Ok(Self::new(
            semantic,
            keyword,
            store,
            weights,
            config.search_timeout,
        ))
    }

    /// Searches with the weights this retriever was constructed with.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Retrieval`] when both backends fail, and
    /// [`RagError::Index`] when the chunk store is unreachable.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, RagError> {
        self.search_weighted(query, k, self.weights).await
    }

    /// Searches with an explicit weight pair (per-run override path).
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn search_weighted(
        &self,
        query: &str,
        k: usize,
        weights: BlendWeights,
    ) -> Result<RetrievalResult, RagError> {
        let semantic_fut = timed("semantic", self.search_timeout, self.semantic.search(query, k));
        let keyword_fut = timed("keyword", self.search_timeout, self.keyword.search(query, k));
        let (semantic_hits, keyword_hits) = tokio::join!(semantic_fut, keyword_fut);

        let (blended, semantic_error, keyword_error) = match (semantic_hits, keyword_hits) {
            (Ok(sem), Ok(kw)) => (blend(&sem, &kw, weights), None, None),
            (Ok(sem), Err(kw_err)) => {
                warn!(error = %kw_err, "keyword backend failed, degrading to semantic results");
                (single_backend(&sem, Side::Semantic), None, Some(kw_err.to_string()))
            }
            (Err(sem_err), Ok(kw)) => {
                warn!(error = %sem_err, "semantic backend failed, degrading to keyword results");
                (single_backend(&kw, Side::Keyword), Some(sem_err.to_string()), None)
            }
            (Err(sem_err), Err(kw_err)) => {
                return Err(RagError::Retrieval {
                    semantic: sem_err.to_string(),
                    keyword: kw_err.to_string(),
                });
            }
        };

        let chunks = self.load_chunks(blended, k).await?;
        debug!(
            query_len = query.len(),
            k,
            results = chunks.len(),
            degraded = semantic_error.is_some() || keyword_error.is_some(),
            "hybrid search complete"
        );

        Ok(RetrievalResult {
            chunks,
            semantic_error,
            keyword_error,
        })
    }

    /// Fetches chunk content for the top-`k` blended hits, dropping hits
    /// whose chunks are missing from the store.
    async fn load_chunks(
        &self,
        mut blended: Vec<BlendedHit>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        // Stable sort: equal combined scores keep original backend rank.
        blended.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        blended.truncate(k);

        let ids: Vec<String> = blended.iter().map(|h| h.chunk_id.clone()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self.store.fetch(&ids).await?;
        let mut by_id: HashMap<String, crate::types::Chunk> =
            fetched.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut chunks = Vec::with_capacity(blended.len());
        for hit in blended {
            match by_id.remove(&hit.chunk_id) {
                Some(chunk) => chunks.push(ScoredChunk {
                    chunk,
                    semantic_score: hit.semantic,
                    keyword_score: hit.keyword,
                    combined_score: hit.combined,
                }),
                None => {
                    warn!(chunk_id = %hit.chunk_id, "chunk missing from store, dropping hit");
                }
            }
        }
        Ok(chunks)
    }
}

/// Wraps a backend call in its timeout, converting elapsed deadlines into
/// the same error shape as a failed call.
async fn timed(
    backend: &'static str,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<Vec<IndexHit>, RagError>>,
) -> Result<Vec<IndexHit>, RagError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Index {
            backend: backend.to_string(),
            message: format!("timed out after {timeout:?}"),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Semantic,
    Keyword,
}

/// A deduplicated hit with normalized per-backend scores.
#[derive(Debug, Clone)]
struct BlendedHit {
    chunk_id: String,
    semantic: f32,
    keyword: f32,
    combined: f32,
}

/// Min-max normalizes raw scores over a single result set.
///
/// A set where every score is equal (including a single hit) normalizes
/// to 1.0 to avoid a divide-by-zero.
fn normalize(hits: &[IndexHit]) -> Vec<(String, f32)> {
    if hits.is_empty() {
        return Vec::new();
    }
    let min = hits.iter().map(|h| h.raw_score).fold(f32::INFINITY, f32::min);
    let max = hits
        .iter()
        .map(|h| h.raw_score)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    hits.iter()
        .map(|h| {
            let score = if range > f32::EPSILON {
                (h.raw_score - min) / range
            } else {
                1.0
            };
            (h.chunk_id.clone(), score)
        })
        .collect()
}

/// Blends two normalized result sets, deduplicating by chunk ID.
///
/// A chunk present in both sets gets the weighted combination; a chunk in
/// only one set scores 0 for the missing dimension. Insertion order
/// (semantic rank, then keyword-only rank) is the tiebreak order for the
/// later stable sort.
fn blend(semantic: &[IndexHit], keyword: &[IndexHit], weights: BlendWeights) -> Vec<BlendedHit> {
    let mut hits: Vec<BlendedHit> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (id, score) in normalize(semantic) {
        if position.contains_key(&id) {
            continue;
        }
        position.insert(id.clone(), hits.len());
        hits.push(BlendedHit {
            chunk_id: id,
            semantic: score,
            keyword: 0.0,
            combined: 0.0,
        });
    }

    for (id, score) in normalize(keyword) {
        if let Some(&idx) = position.get(&id) {
            hits[idx].keyword = hits[idx].keyword.max(score);
        } else {
            position.insert(id.clone(), hits.len());
            hits.push(BlendedHit {
                chunk_id: id,
                semantic: 0.0,
                keyword: score,
                combined: 0.0,
            });
        }
    }

    for hit in &mut hits {
        hit.combined = weights.semantic() * hit.semantic + weights.keyword() * hit.keyword;
    }
    hits
}

/// Builds hits from a single surviving backend.
///
/// The combined score is the backend's normalized score alone rather than
/// the weighted formula: with one backend down, scaling every result by a
/// partial weight would misrepresent quality against the configured floors.
fn single_backend(hits: &[IndexHit], side: Side) -> Vec<BlendedHit> {
    let mut seen: HashSet<String> = HashSet::new();
    normalize(hits)
        .into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .map(|(id, score)| BlendedHit {
            chunk_id: id,
            semantic: if side == Side::Semantic { score } else { 0.0 },
            keyword: if side == Side::Keyword { score } else { 0.0 },
            combined: score,
        })
        .collect()
}
