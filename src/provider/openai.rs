//! `OpenAI`-compatible providers using the `async-openai` crate.
//!
//! Covers `OpenAI` itself plus any API following the same chat-completion
//! spec. Groq exposes such an endpoint, so [`GroqProvider`] reuses the same
//! client with a different default base URL and name tag.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use super::{GenerationProvider, GenerationRequest};
use crate::config::ProviderSpec;
use crate::error::RagError;

/// Default base URL for the Groq `OpenAI`-compatible endpoint.
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Builds an `async-openai` client for the given credentials.
fn build_client(api_key: &str, base_url: Option<&str>) -> Client<OpenAIConfig> {
    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(url) = base_url {
        config = config.with_api_base(url);
    }
    Client::with_config(config)
}

/// Requires an API key in the spec, mapping absence to a config error.
fn require_api_key(spec: &ProviderSpec) -> Result<&str, RagError> {
    spec.api_key.as_deref().ok_or_else(|| RagError::Config {
        message: format!("provider '{}' requires an api_key", spec.name),
    })
}

/// Converts our request into an `OpenAI` chat completion request.
fn build_request(model: &str, request: &GenerationRequest) -> CreateChatCompletionRequest {
    let messages = vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(request.system.clone()),
            name: None,
        }),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(request.prompt.clone()),
            name: None,
        }),
    ];

    CreateChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: Some(request.temperature).filter(|&t| t != 0.0),
        max_completion_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// Runs the chat completion and extracts the first choice's text.
async fn chat_completion(
    client: &Client<OpenAIConfig>,
    provider_name: &'static str,
    model: &str,
    request: &GenerationRequest,
) -> Result<String, RagError> {
    let response = client
        .chat()
        .create(build_request(model, request))
        .await
        .map_err(|e| RagError::Provider {
            provider: provider_name.to_string(),
            message: e.to_string(),
        })?;

    Ok(response
        .choices
        .first()
        .and_then(|c| c.message.content.as_ref())
        .cloned()
        .unwrap_or_default())
}

/// `OpenAI`-compatible provider.
///
/// Works against `OpenAI` or any proxy/compatible API via the base URL
/// override in [`ProviderSpec`].
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    /// Creates a provider from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the spec has no API key.
    pub fn new(spec: &ProviderSpec) -> Result<Self, RagError> {
        let api_key = require_api_key(spec)?;
        Ok(Self {
            client: build_client(api_key, spec.base_url.as_deref()),
            model: spec.model.clone(),
        })
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
        chat_completion(&self.client, self.name(), &self.model, request).await
    }
}

/// Groq provider, speaking the `OpenAI` chat-completion dialect.
pub struct GroqProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl GroqProvider {
    /// Creates a provider from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the spec has no API key.
    pub fn new(spec: &ProviderSpec) -> Result<Self, RagError> {
        let api_key = require_api_key(spec)?;
        let base_url = spec.base_url.as_deref().unwrap_or(GROQ_BASE_URL);
        Ok(Self {
            client: build_client(api_key, Some(base_url)),
            model: spec.model.clone(),
        })
    }
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationProvider for GroqProvider {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
        chat_completion(&self.client, self.name(), &self.model, request).await
    }
}
