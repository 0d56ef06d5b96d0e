//! Self-hosted Ollama provider over plain HTTP.
//!
//! Talks to the `/api/generate` endpoint of a local or remote Ollama
//! instance. No API key is required; the system prompt is folded into the
//! request prompt because the generate endpoint takes a single string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationProvider, GenerationRequest};
use crate::config::ProviderSpec;
use crate::error::RagError;

/// Default base URL for a local Ollama instance.
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Ollama text-generation provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Creates a provider from its configuration entry.
    #[must_use]
    pub fn new(spec: &ProviderSpec) -> Self {
        let base_url = spec
            .base_url
            .clone()
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: spec.model.clone(),
        }
    }

    fn provider_err(&self, message: impl Into<String>) -> RagError {
        RagError::Provider {
            provider: self.name().to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: format!("{}\n\n{}", request.system, request.prompt),
            stream: false,
            options: OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.provider_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.provider_err(format!("HTTP {status}")));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| self.provider_err(format!("invalid response body: {e}")))?;

        Ok(parsed.response)
    }
}
