//! Pluggable text-generation providers.
//!
//! Each provider translates the engine's provider-agnostic
//! [`GenerationRequest`] into vendor-specific API calls. The set of
//! providers is closed: names are mapped to concrete implementations by
//! [`create_provider`] at startup, and unknown names are rejected as a
//! configuration error rather than at call time.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;

use crate::config::ProviderSpec;
use crate::error::RagError;

pub use ollama::OllamaProvider;
pub use openai::{GroqProvider, OpenAiProvider};

/// A provider-agnostic generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instructions framing the assistant's behavior.
    pub system: String,
    /// User-facing prompt (question plus any assembled context).
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Trait for text-generation backends.
///
/// Implementations handle the transport layer for a specific vendor while
/// presenting a uniform "generate text given prompt" contract to the
/// [gateway](crate::gateway::ProviderGateway). Timeouts are enforced by the
/// gateway, not by implementations.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name (e.g. `"openai"`, `"ollama"`).
    fn name(&self) -> &'static str;

    /// Executes a single generation request and returns the raw text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Provider`] on API failures or malformed
    /// responses.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError>;
}

/// Returns `true` if the given provider name has a registered implementation.
#[must_use]
pub fn is_supported(name: &str) -> bool {
    matches!(name, "openai" | "groq" | "ollama")
}

/// Creates a [`GenerationProvider`] from a configuration entry.
///
/// # Supported Providers
///
/// - `"openai"` — OpenAI-compatible APIs via `async-openai`
/// - `"groq"` — Groq's OpenAI-compatible endpoint
/// - `"ollama"` — self-hosted Ollama over HTTP
///
/// # Errors
///
/// Returns [`RagError::UnknownProvider`] for unregistered names and
/// [`RagError::Config`] when a required credential is missing.
pub fn create_provider(spec: &ProviderSpec) -> Result<Box<dyn GenerationProvider>, RagError> {
    match spec.name.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(spec)?)),
        "groq" => Ok(Box::new(GroqProvider::new(spec)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(spec))),
        other => Err(RagError::UnknownProvider {
            name: other.to_string(),
        }),
    }
}
