//! Deterministic quality scoring for retrieval results and answers.
//!
//! No model calls: scores are cheap heuristics over counts, lengths, and
//! blended relevance scores, producing a scalar in `[0, 1]` that the
//! orchestrator compares against the configured quality floor to route
//! between refinement, regeneration, and finalization. Pure functions of
//! their inputs — same input, same metrics.

use crate::config::RagConfig;
use crate::types::{QualityMetrics, ReasonCode, RetrievalResult};

/// Weight of the result-count term in the retrieval score.
const RETRIEVAL_COUNT_WEIGHT: f32 = 0.5;
/// Weight of the top-score term in the retrieval score.
const RETRIEVAL_TOP_WEIGHT: f32 = 0.5;
/// Weight of the length term in the answer score.
const ANSWER_LENGTH_WEIGHT: f32 = 0.4;
/// Weight of the context-usage term in the answer score.
const ANSWER_CONTEXT_WEIGHT: f32 = 0.3;
/// Weight of the length-penalty term in the answer score.
const ANSWER_PENALTY_WEIGHT: f32 = 0.3;

/// Scores retrieval results and generated answers.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    expected_result_count: usize,
    top_score_floor: f32,
    min_answer_chars: usize,
    max_answer_chars: usize,
}

impl QualityEvaluator {
    /// Creates an evaluator with thresholds taken from configuration.
    #[must_use]
    pub const fn new(config: &RagConfig) -> Self {
        Self {
            expected_result_count: config.expected_result_count,
            top_score_floor: config.top_score_floor,
            min_answer_chars: config.min_answer_chars,
            max_answer_chars: config.max_answer_chars,
        }
    }

    /// Scores a retrieval result set.
    ///
    /// `score = 0.5 * min(1, count / expected) + 0.5 * top_combined_score`.
    /// Flags `LOW_RESULT_COUNT` below the expected count and
    /// `LOW_TOP_SCORE` below the configured floor.
    #[must_use]
    pub fn evaluate_retrieval(&self, result: &RetrievalResult) -> QualityMetrics {
        let count = result.len();
        #[allow(clippy::cast_precision_loss)]
        let count_term = (count as f32 / self.expected_result_count as f32).min(1.0);
        let top = result.top_score();

        let mut reason_codes = Vec::new();
        if count < self.expected_result_count {
            reason_codes.push(ReasonCode::LowResultCount);
        }
        if top < self.top_score_floor {
            reason_codes.push(ReasonCode::LowTopScore);
        }

        QualityMetrics {
            score: (RETRIEVAL_COUNT_WEIGHT * count_term + RETRIEVAL_TOP_WEIGHT * top)
                .clamp(0.0, 1.0),
            reason_codes,
        }
    }

    /// Scores a generated answer.
    ///
    /// `score = 0.4 * min(1, len/min_length) + 0.3 * context_used
    /// + 0.3 * (1 - excessive_length_penalty)`, where the penalty fires
    /// when the answer exceeds the configured maximum length (a signal of
    /// truncation or rambling). Flags `SHORT_ANSWER`, `NO_CONTEXT_USED`,
    /// and `EXCESSIVE_LENGTH` as applicable.
    #[must_use]
    pub fn evaluate_answer(&self, text: &str, context_used: usize) -> QualityMetrics {
        let len = text.chars().count();
        #[allow(clippy::cast_precision_loss)]
        let length_term = (len as f32 / self.min_answer_chars as f32).min(1.0);
        let context_term = if context_used > 0 { 1.0 } else { 0.0 };
        let penalty = if len > self.max_answer_chars { 1.0 } else { 0.0 };

        let mut reason_codes = Vec::new();
        if len < self.min_answer_chars {
            reason_codes.push(ReasonCode::ShortAnswer);
        }
        if context_used == 0 {
            reason_codes.push(ReasonCode::NoContextUsed);
        }
        if len > self.max_answer_chars {
            reason_codes.push(ReasonCode::ExcessiveLength);
        }

        QualityMetrics {
            score: (ANSWER_LENGTH_WEIGHT * length_term
                + ANSWER_CONTEXT_WEIGHT * context_term
                + ANSWER_PENALTY_WEIGHT * (1.0 - penalty))
                .clamp(0.0, 1.0),
            reason_codes,
        }
    }
}
