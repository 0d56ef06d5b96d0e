//! Data model for a single orchestration run.
//!
//! Every entity here is created at the start of a [`run`] call and discarded
//! at its end; the engine persists nothing. Chunks are owned by the external
//! index and only read, never mutated.
//!
//! [`run`]: crate::orchestrator::Orchestrator::run

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ProviderFailure;

/// A user query, immutable once issued.
///
/// A refinement produces a *new* `Query` linked to the original via the
/// `generation` counter (0 = the original user query).
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    /// Query text.
    pub text: String,
    /// Refinement generation (0 = original, 1 = first rewrite, ...).
    pub generation: u32,
    /// When this query was issued.
    pub created_at: SystemTime,
}

impl Query {
    /// Creates an original (generation 0) query.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation: 0,
            created_at: SystemTime::now(),
        }
    }

    /// Creates the refined successor of this query.
    #[must_use]
    pub fn refine(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation: self.generation + 1,
            created_at: SystemTime::now(),
        }
    }
}

/// A retrievable unit of document text, owned by the external index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque chunk identifier.
    pub id: String,
    /// Opaque identifier of the source document.
    pub document_id: String,
    /// Chunk text.
    pub text: String,
    /// Token count of `text`, as computed by the ingestion pipeline.
    pub token_count: usize,
}

/// A chunk with its per-backend and blended relevance scores.
///
/// All scores are normalized to `[0, 1]`. A chunk returned by only one
/// backend carries `0.0` for the missing dimension.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Normalized semantic (embedding similarity) score.
    pub semantic_score: f32,
    /// Normalized keyword (lexical) score.
    pub keyword_score: f32,
    /// `semantic_weight * semantic_score + keyword_weight * keyword_score`.
    pub combined_score: f32,
}

/// An ordered retrieval result: chunks descending by combined score,
/// ties preserving original backend rank. Never re-ordered after creation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    /// Scored chunks, best first.
    pub chunks: Vec<ScoredChunk>,
    /// Failure reason when the semantic backend was unavailable and the
    /// retriever degraded to keyword results alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_error: Option<String>,
    /// Failure reason when the keyword backend was unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_error: Option<String>,
}

impl RetrievalResult {
    /// Number of retrieved chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` if no chunks were retrieved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Combined score of the best chunk, or `0.0` when empty.
    #[must_use]
    pub fn top_score(&self) -> f32 {
        self.chunks.first().map_or(0.0, |c| c.combined_score)
    }

    /// Returns `true` if either backend failed for this search.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.semantic_error.is_some() || self.keyword_error.is_some()
    }
}

/// Why a quality score fell below expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Fewer results than the configured expected count.
    LowResultCount,
    /// Best combined score below the configured floor.
    LowTopScore,
    /// Answer shorter than the configured minimum length.
    ShortAnswer,
    /// Answer generated without any retrieved context.
    NoContextUsed,
    /// Answer exceeded the configured maximum length (truncation/rambling).
    ExcessiveLength,
}

/// Quality assessment produced at each evaluation point. Never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    /// Scalar quality in `[0, 1]` used for routing decisions.
    pub score: f32,
    /// Diagnostic flags explaining a low score.
    pub reason_codes: Vec<ReasonCode>,
}

impl QualityMetrics {
    /// Returns `true` if the given reason code was flagged.
    #[must_use]
    pub fn has(&self, code: ReasonCode) -> bool {
        self.reason_codes.contains(&code)
    }

    /// Returns `true` if `score` meets the given quality floor.
    #[must_use]
    pub fn passes(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// Result of a gateway generation call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    /// Generated text.
    pub text: String,
    /// Provider that produced the text.
    pub provider_used: String,
    /// `true` if any provider beyond the first in the chain succeeded.
    pub fallback_used: bool,
    /// Wall-clock latency of the successful attempt.
    pub latency_ms: u64,
    /// Providers that failed before the successful one, in chain order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

/// Per-run overrides for orchestration knobs.
///
/// Each `Option` field falls back to the engine configuration when unset.
/// Weight overrides must be supplied as a pair and sum to 1.0.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum chunks to retrieve per search.
    pub k: Option<usize>,
    /// Semantic blend weight override.
    pub semantic_weight: Option<f32>,
    /// Keyword blend weight override.
    pub keyword_weight: Option<f32>,
    /// Maximum search invocations before proceeding with what exists.
    pub max_search_attempts: Option<u32>,
    /// Maximum generation invocations before accepting the answer.
    pub max_generation_attempts: Option<u32>,
    /// Token budget for the assembled context.
    pub max_context_tokens: Option<usize>,
    /// When `false`, run a single-shot search + generate with no
    /// refinement or regeneration loop (degraded/fast mode).
    pub use_agentic: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            k: None,
            semantic_weight: None,
            keyword_weight: None,
            max_search_attempts: None,
            max_generation_attempts: None,
            max_context_tokens: None,
            use_agentic: true,
        }
    }
}

/// Final result of an orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The original user query text.
    pub query: String,
    /// The final answer.
    pub answer: String,
    /// The last refined query text, if any refinement happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_query: Option<String>,
    /// Quality of the retrieval that fed the answer.
    pub retrieval_quality: QualityMetrics,
    /// Quality of the final answer.
    pub answer_quality: QualityMetrics,
    /// Every quality assessment made during the run, in order.
    pub metrics_history: Vec<QualityMetrics>,
    /// Chunks included in the generation context.
    pub chunks_used: Vec<Chunk>,
    /// Number of SEARCH invocations performed.
    pub search_attempts: u32,
    /// Number of GENERATE invocations performed.
    pub generation_attempts: u32,
    /// Provider that produced the final answer.
    pub provider_used: String,
    /// `true` if any generation or rewrite call fell back past the
    /// first configured provider.
    pub fallback_used: bool,
    /// `true` if a single oversized chunk was truncated to fit the budget.
    pub context_truncated: bool,
    /// Cumulative time spent in search, in milliseconds.
    pub search_duration_ms: u64,
    /// Total run duration in milliseconds.
    pub total_duration_ms: u64,
    /// Phase-by-phase trace of the run, for diagnostics.
    pub trace: Vec<String>,
}
