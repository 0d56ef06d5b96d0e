//! System prompts and template builders for generation and query rewriting.
//!
//! Prompts keep the answer grounded in retrieved context: the model is told
//! to answer only from the provided documents and to say so when the
//! context is insufficient, rather than inventing an answer.

use std::fmt::Write;

use crate::types::ReasonCode;

/// System prompt for grounded answer generation.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are an internal company assistant answering questions \
against a private document corpus. Answer clearly and helpfully using ONLY the information in the \
provided context documents. If the context does not contain enough information to answer, say so \
explicitly and suggest the user rephrase or contact the responsible team. Never invent facts that \
are not present in the context.";

/// System prompt for query rewriting.
pub const REWRITE_SYSTEM_PROMPT: &str = "You rewrite search queries to improve retrieval from a \
document corpus. Respond with the rewritten query only, no explanations or surrounding text.";

/// Marker inserted in place of context when retrieval produced nothing.
///
/// Distinct from an aborted run: the model is asked to state that it lacks
/// grounding instead of answering from context.
pub const NO_CONTEXT_MARKER: &str = "[no context documents were retrieved for this question]";

/// Extra instruction appended on regeneration attempts.
const RETRY_INSTRUCTION: &str = "Your previous answer was too thin. Be more thorough: cover the \
question completely and ground every statement in the context documents.";

/// Builds the user prompt for answer generation.
///
/// `context` is the assembled document text, or `None` on the empty-context
/// path. The *original* user query is always used here, never a refined
/// one, so the answer stays aligned with user intent. `retry` appends a
/// stricter instruction for regeneration attempts.
#[must_use]
pub fn build_answer_prompt(query: &str, context: Option<&str>, retry: bool) -> String {
    let mut prompt = String::new();

    match context {
        Some(ctx) if !ctx.is_empty() => {
            let _ = writeln!(prompt, "Context:\n{ctx}\n");
        }
        _ => {
            let _ = writeln!(prompt, "Context:\n{NO_CONTEXT_MARKER}\n");
            let _ = writeln!(
                prompt,
                "No supporting documents were found. State that you lack sufficient information \
                 to answer from the corpus.\n"
            );
        }
    }

    let _ = writeln!(prompt, "Question: {query}");
    if retry {
        let _ = write!(prompt, "\n{RETRY_INSTRUCTION}");
    }
    prompt
}

/// Builds the rewrite prompt from the current query and the reasons the
/// last retrieval was judged weak.
#[must_use]
pub fn build_rewrite_prompt(query: &str, reasons: &[ReasonCode]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Original query: {query}");
    if reasons.is_empty() {
        let _ = writeln!(prompt, "The search results were not satisfactory.");
    } else {
        let _ = writeln!(prompt, "The search results were weak because:");
        for reason in reasons {
            let _ = writeln!(prompt, "- {}", describe_reason(*reason));
        }
    }
    let _ = write!(
        prompt,
        "Suggest a rewritten query that is more likely to find relevant documents."
    );
    prompt
}

/// Human-readable description of a reason code, for rewrite prompts.
const fn describe_reason(code: ReasonCode) -> &'static str {
    match code {
        ReasonCode::LowResultCount => "too few documents matched",
        ReasonCode::LowTopScore => "even the best match scored poorly",
        ReasonCode::ShortAnswer => "the generated answer was too short",
        ReasonCode::NoContextUsed => "no retrieved context was available",
        ReasonCode::ExcessiveLength => "the generated answer was excessively long",
    }
}
