//! Context assembly under a token budget.
//!
//! Selects retrieved chunks greedily in descending combined-score order and
//! formats them into the context block handed to the generation prompt.
//! Deterministic and side-effect-free: the same retrieval result and budget
//! always yield the same context.

use std::fmt::Write;

use crate::types::{Chunk, RetrievalResult};

/// Context produced by [`assemble`], with the metadata the orchestrator
/// carries into the final report.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Formatted context text for the generation prompt. Empty when the
    /// retrieval result had no chunks.
    pub text: String,
    /// Chunks included, in selection order.
    pub chunks_used: Vec<Chunk>,
    /// Token total of the included chunks.
    pub total_tokens: usize,
    /// `true` when a single oversized chunk was cut down to fit the budget.
    pub truncated: bool,
}

impl AssembledContext {
    /// Returns `true` when no context could be assembled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks_used.is_empty()
    }
}

/// Greedily packs chunks into the token budget, best-scored first.
///
/// Chunks are never split to fit partially, and selection stops at the
/// first chunk that would overflow the budget: a lower-scored chunk never
/// displaces a higher-scored one that was cut off. The single pathological
/// case, a result whose best chunk alone exceeds the budget, truncates
/// that chunk's text proportionally to the budget and flags the context
/// as truncated instead of exceeding it.
#[must_use]
pub fn assemble(result: &RetrievalResult, max_tokens: usize) -> AssembledContext {
    let mut chunks_used: Vec<Chunk> = Vec::new();
    let mut total_tokens = 0usize;

    for scored in &result.chunks {
        let cost = scored.chunk.token_count;
        if total_tokens + cost > max_tokens {
            break;
        }
        total_tokens += cost;
        chunks_used.push(scored.chunk.clone());
    }

    if chunks_used.is_empty() {
        if let Some(first) = result.chunks.first() {
            let truncated_chunk = truncate_to_budget(&first.chunk, max_tokens);
            let text = format_chunks(std::slice::from_ref(&truncated_chunk));
            return AssembledContext {
                text,
                chunks_used: vec![truncated_chunk],
                total_tokens: max_tokens,
                truncated: true,
            };
        }
        return AssembledContext {
            text: String::new(),
            chunks_used: Vec::new(),
            total_tokens: 0,
            truncated: false,
        };
    }

    AssembledContext {
        text: format_chunks(&chunks_used),
        chunks_used,
        total_tokens,
        truncated: false,
    }
}

/// Cuts a chunk's text down to approximately `max_tokens`, scaling the
/// character length by the token ratio.
fn truncate_to_budget(chunk: &Chunk, max_tokens: usize) -> Chunk {
    let char_len = chunk.text.chars().count();
    let keep = if chunk.token_count == 0 {
        char_len
    } else {
        char_len * max_tokens / chunk.token_count
    };
    let mut text: String = chunk.text.chars().take(keep).collect();
    if keep < char_len {
        text.push('…');
    }
    Chunk {
        id: chunk.id.clone(),
        document_id: chunk.document_id.clone(),
        text,
        token_count: max_tokens,
    }
}

/// Formats chunks as numbered document blocks.
fn format_chunks(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "Document {}:\n{}", i + 1, chunk.text);
    }
    out
}
