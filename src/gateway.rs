//! Provider gateway: ordered fallback across the configured provider chain.
//!
//! The orchestrator never talks to a provider directly. Every generation and
//! rewrite goes through the gateway, which walks the chain in configuration
//! order, enforces a per-attempt timeout, and treats an error, a timeout, or
//! an empty response identically: record the failure and move on. Only when
//! every provider has been exhausted does the call fail.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::error::{ProviderFailure, RagError};
use crate::prompt::{ANSWER_SYSTEM_PROMPT, REWRITE_SYSTEM_PROMPT, build_rewrite_prompt};
use crate::provider::{GenerationProvider, GenerationRequest, create_provider};
use crate::types::{GenerationResult, ReasonCode};

/// Sampling temperature for query rewrites. Rewrites should be conservative
/// regardless of the configured answer temperature.
const REWRITE_TEMPERATURE: f32 = 0.3;

struct ChainEntry {
    provider: Box<dyn GenerationProvider>,
    timeout: Duration,
}

/// Fallback chain over the configured generation providers.
pub struct ProviderGateway {
    chain: Vec<ChainEntry>,
    rewrite_timeout: Duration,
    answer_max_tokens: u32,
    rewrite_max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|e| e.provider.name()).collect();
        f.debug_struct("ProviderGateway")
            .field("chain", &names)
            .finish_non_exhaustive()
    }
}

impl ProviderGateway {
    /// Builds the gateway from configuration, instantiating every provider
    /// in the chain up front.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnknownProvider`] for unregistered names and
    /// [`RagError::Config`] when a provider's required credential is missing.
    pub fn new(config: &RagConfig) -> Result<Self, RagError> {
        let mut chain = Vec::with_capacity(config.providers.len());
        for spec in &config.providers {
            chain.push(ChainEntry {
                provider: create_provider(spec)?,
                timeout: spec.timeout.unwrap_or(config.generate_timeout),
            });
        }
        Ok(Self {
            chain,
            rewrite_timeout: config.rewrite_timeout,
            answer_max_tokens: config.answer_max_tokens,
            rewrite_max_tokens: config.rewrite_max_tokens,
            temperature: config.temperature,
        })
    }

    /// Builds a gateway over pre-constructed providers, all sharing the
    /// configured default timeout. Used when providers are supplied by the
    /// caller rather than resolved from specs.
    #[must_use]
    pub fn with_providers(
        providers: Vec<Box<dyn GenerationProvider>>,
        config: &RagConfig,
    ) -> Self {
        Self {
            chain: providers
                .into_iter()
                .map(|provider| ChainEntry {
                    provider,
                    timeout: config.generate_timeout,
                })
                .collect(),
            rewrite_timeout: config.rewrite_timeout,
            answer_max_tokens: config.answer_max_tokens,
            rewrite_max_tokens: config.rewrite_max_tokens,
            temperature: config.temperature,
        }
    }

    /// Generates an answer from the given user prompt, falling back down
    /// the chain until a provider returns non-empty text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] listing every failed attempt when
    /// the whole chain is exhausted.
    pub async fn generate(&self, prompt: &str) -> Result<GenerationResult, RagError> {
        let request = GenerationRequest {
            system: ANSWER_SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            max_tokens: self.answer_max_tokens,
            temperature: self.temperature,
        };
        self.run_chain(&request, None).await
    }

    /// Rewrites a query that produced weak retrieval results.
    ///
    /// Uses the shorter rewrite timeout for every attempt; a rewrite is an
    /// optimization, not worth waiting a full generation window for.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] when no provider produced a rewrite.
    /// Callers treat this as recoverable and keep the current query.
    pub async fn rewrite(
        &self,
        query: &str,
        reasons: &[ReasonCode],
    ) -> Result<GenerationResult, RagError> {
        let request = GenerationRequest {
            system: REWRITE_SYSTEM_PROMPT.to_string(),
            prompt: build_rewrite_prompt(query, reasons),
            max_tokens: self.rewrite_max_tokens,
            temperature: REWRITE_TEMPERATURE,
        };
        self.run_chain(&request, Some(self.rewrite_timeout)).await
    }

    async fn run_chain(
        &self,
        request: &GenerationRequest,
        timeout_override: Option<Duration>,
    ) -> Result<GenerationResult, RagError> {
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for (position, entry) in self.chain.iter().enumerate() {
            let name = entry.provider.name();
            let timeout = timeout_override.unwrap_or(entry.timeout);
            let attempt_start = Instant::now();

            let outcome = tokio::time::timeout(timeout, entry.provider.generate(request)).await;
            let reason = match outcome {
                Err(_) => format!("timed out after {timeout:?}"),
                Ok(Err(e)) => e.to_string(),
                Ok(Ok(text)) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        "empty response".to_string()
                    } else {
                        // The successful attempt alone: time burned on
                        // failed providers is visible in the trace, not
                        // in this figure.
                        #[allow(clippy::cast_possible_truncation)]
                        let latency_ms = attempt_start.elapsed().as_millis() as u64;
                        debug!(
                            provider = name,
                            fallback = position > 0,
                            latency_ms,
                            "generation succeeded"
                        );
                        return Ok(GenerationResult {
                            text,
                            provider_used: name.to_string(),
                            fallback_used: position > 0,
                            latency_ms,
                            failures,
                        });
                    }
                }
            };

            warn!(provider = name, %reason, "provider attempt failed, trying next in chain");
            failures.push(ProviderFailure {
                provider: name.to_string(),
                reason,
            });
        }

        Err(RagError::Generation { attempts: failures })
    }
}
