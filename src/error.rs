//! Error taxonomy for the orchestration engine.
//!
//! Fatal conditions surface as typed [`RagError`] variants so callers can
//! inspect what failed (which backends, which providers) and decide on
//! user-facing messaging. Recoverable conditions — one search backend down,
//! a failed rewrite, a below-threshold score with attempts remaining — are
//! absorbed inside the components and reflected only in quality metrics
//! and trace metadata.

use thiserror::Error;

/// A single failed provider attempt, recorded during gateway fallback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProviderFailure {
    /// Provider name (e.g. `"openai"`).
    pub provider: String,
    /// Why the attempt failed (timeout, API error, empty response).
    pub reason: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Errors produced by the orchestration engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid configuration detected at construction time.
    ///
    /// Raised before any run is accepted: bad blend weights, non-positive
    /// attempt limits, an empty provider chain.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// A provider name in the configuration has no registered implementation.
    #[error("Unknown provider: {name}")]
    UnknownProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// A single search backend call failed.
    ///
    /// The hybrid retriever absorbs this when the other backend succeeds;
    /// it only escapes a [`Search`](crate::retriever::HybridRetriever::search)
    /// call wrapped in [`RagError::Retrieval`].
    #[error("Index backend '{backend}' failed: {message}")]
    Index {
        /// Which backend failed (`"semantic"` or `"keyword"`).
        backend: String,
        /// Failure detail from the backend.
        message: String,
    },

    /// Both search backends failed; no results are available.
    #[error("Retrieval failed: semantic backend: {semantic}; keyword backend: {keyword}")]
    Retrieval {
        /// Failure reason from the semantic backend.
        semantic: String,
        /// Failure reason from the keyword backend.
        keyword: String,
    },

    /// A single provider attempt failed (API error, timeout, empty response).
    ///
    /// The gateway absorbs this and tries the next provider in the chain;
    /// it only escapes as [`RagError::Generation`] once every provider
    /// has been exhausted.
    #[error("Provider '{provider}' failed: {message}")]
    Provider {
        /// Provider that failed.
        provider: String,
        /// Failure detail.
        message: String,
    },

    /// Every configured provider failed or timed out.
    #[error("Generation failed after {} provider attempt(s): {}", attempts.len(), format_attempts(attempts))]
    Generation {
        /// Each attempted provider with its failure reason, in chain order.
        attempts: Vec<ProviderFailure>,
    },

    /// The caller passed invalid run input (e.g. an empty query).
    #[error("Invalid run input: {message}")]
    InvalidInput {
        /// What is wrong with the input.
        message: String,
    },
}

fn format_attempts(attempts: &[ProviderFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_lists_all_attempts() {
        let err = RagError::Generation {
            attempts: vec![
                ProviderFailure {
                    provider: "openai".to_string(),
                    reason: "timeout after 30s".to_string(),
                },
                ProviderFailure {
                    provider: "ollama".to_string(),
                    reason: "connection refused".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 provider attempt(s)"));
        assert!(msg.contains("openai: timeout after 30s"));
        assert!(msg.contains("ollama: connection refused"));
    }

    #[test]
    fn test_retrieval_error_names_both_backends() {
        let err = RagError::Retrieval {
            semantic: "deadline exceeded".to_string(),
            keyword: "index unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("semantic backend: deadline exceeded"));
        assert!(msg.contains("keyword backend: index unavailable"));
    }

    #[test]
    fn test_provider_failure_display() {
        let failure = ProviderFailure {
            provider: "groq".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(failure.to_string(), "groq: HTTP 503");
    }
}
