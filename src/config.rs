//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. All limits and thresholds are validated when the
//! builder finishes, so an invalid configuration is rejected before the
//! orchestrator accepts any run (fail fast, not per-request).

use std::time::Duration;

use crate::error::RagError;

/// Default semantic blend weight.
const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;
/// Default keyword blend weight.
const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;
/// Default chunks retrieved per search.
const DEFAULT_TOP_K: usize = 5;
/// Default result count target used by the retrieval quality formula.
const DEFAULT_EXPECTED_RESULT_COUNT: usize = 3;
/// Default quality floor below which the engine attempts self-correction.
const DEFAULT_QUALITY_THRESHOLD: f32 = 0.6;
/// Default floor for the best combined score before flagging `LOW_TOP_SCORE`.
const DEFAULT_TOP_SCORE_FLOOR: f32 = 0.3;
/// Default maximum SEARCH invocations per run.
const DEFAULT_MAX_SEARCH_ATTEMPTS: u32 = 3;
/// Default maximum GENERATE invocations per run.
const DEFAULT_MAX_GENERATION_ATTEMPTS: u32 = 2;
/// Default token budget for assembled context.
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8000;
/// Default minimum answer length in characters.
const DEFAULT_MIN_ANSWER_CHARS: usize = 40;
/// Default maximum answer length in characters before the length penalty.
const DEFAULT_MAX_ANSWER_CHARS: usize = 2000;
/// Default timeout per search backend sub-query.
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 5;
/// Default timeout per provider generation attempt.
const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 30;
/// Default timeout per provider rewrite attempt.
const DEFAULT_REWRITE_TIMEOUT_SECS: u64 = 10;
/// Default maximum tokens for generated answers.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 1000;
/// Default maximum tokens for query rewrites.
const DEFAULT_REWRITE_MAX_TOKENS: u32 = 100;
/// Default sampling temperature for answer generation.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Tolerance when checking that blend weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f32 = 1e-6;

/// One entry in the ordered provider fallback chain.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Registered provider name (`"openai"`, `"groq"`, `"ollama"`).
    pub name: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// API key, if the provider requires one.
    pub api_key: Option<String>,
    /// Base URL override (proxies, compatible APIs, self-hosted endpoints).
    pub base_url: Option<String>,
    /// Per-provider generation timeout; falls back to
    /// [`RagConfig::generate_timeout`] when unset.
    pub timeout: Option<Duration>,
}

impl ProviderSpec {
    /// Creates a spec for a registered provider with its default model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let model = default_model(&name).to_string();
        Self {
            name,
            model,
            api_key: None,
            base_url: None,
            timeout: None,
        }
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-provider generation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Default model per registered provider name. Unknown names get an empty
/// model and are rejected by validation.
fn default_model(name: &str) -> &'static str {
    match name {
        "openai" => "gpt-4o-mini",
        "groq" => "llama3-70b-8192",
        "ollama" => "llama3",
        _ => "",
    }
}

/// Configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Weight of the semantic score in the blend. Must sum to 1.0 with
    /// [`keyword_weight`](Self::keyword_weight).
    pub semantic_weight: f32,
    /// Weight of the keyword score in the blend.
    pub keyword_weight: f32,
    /// Chunks retrieved per search.
    pub top_k: usize,
    /// Result count target for the retrieval quality formula.
    pub expected_result_count: usize,
    /// Quality floor for both retrieval and answer checks.
    pub quality_threshold: f32,
    /// Floor for the best combined score before `LOW_TOP_SCORE` is flagged.
    pub top_score_floor: f32,
    /// Maximum SEARCH invocations per run.
    pub max_search_attempts: u32,
    /// Maximum GENERATE invocations per run.
    pub max_generation_attempts: u32,
    /// Token budget for the assembled context.
    pub max_context_tokens: usize,
    /// Minimum answer length in characters.
    pub min_answer_chars: usize,
    /// Maximum answer length in characters before the length penalty.
    pub max_answer_chars: usize,
    /// Timeout per search backend sub-query.
    pub search_timeout: Duration,
    /// Default timeout per provider generation attempt.
    pub generate_timeout: Duration,
    /// Timeout per provider rewrite attempt.
    pub rewrite_timeout: Duration,
    /// Maximum tokens for generated answers.
    pub answer_max_tokens: u32,
    /// Maximum tokens for query rewrites.
    pub rewrite_max_tokens: u32,
    /// Sampling temperature for answer generation.
    pub temperature: f32,
    /// Ordered provider fallback chain. Must not be empty.
    pub providers: Vec<ProviderSpec>,
}

impl RagConfig {
    /// Creates a new builder for `RagConfig`.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the resulting configuration is
    /// invalid (see [`RagConfigBuilder::build`]).
    pub fn from_env() -> Result<Self, RagError> {
        Self::builder().from_env().build()
    }

    /// Validates cross-field invariants.
    ///
    /// Called by the builder; also usable directly after programmatic edits.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] on invalid weights, non-positive limits,
    /// or an empty provider chain, and [`RagError::UnknownProvider`] for
    /// provider names with no registered implementation.
    pub fn validate(&self) -> Result<(), RagError> {
        validate_weights(self.semantic_weight, self.keyword_weight)?;
        if self.top_k == 0 {
            return Err(config_err("top_k must be positive"));
        }
        if self.expected_result_count == 0 {
            return Err(config_err("expected_result_count must be positive"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(config_err("quality_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.top_score_floor) {
            return Err(config_err("top_score_floor must be within [0, 1]"));
        }
        if self.max_search_attempts == 0 {
            return Err(config_err("max_search_attempts must be positive"));
        }
        if self.max_generation_attempts == 0 {
            return Err(config_err("max_generation_attempts must be positive"));
        }
        if self.max_context_tokens == 0 {
            return Err(config_err("max_context_tokens must be positive"));
        }
        if self.min_answer_chars == 0 || self.max_answer_chars <= self.min_answer_chars {
            return Err(config_err(
                "answer length bounds must satisfy 0 < min_answer_chars < max_answer_chars",
            ));
        }
        if self.providers.is_empty() {
            return Err(config_err("provider chain must not be empty"));
        }
        for spec in &self.providers {
            if !crate::provider::is_supported(&spec.name) {
                return Err(RagError::UnknownProvider {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Checks the weight invariant shared by startup config and per-run overrides.
///
/// # Errors
///
/// Returns [`RagError::Config`] when either weight is outside `[0, 1]` or
/// the pair does not sum to 1.0.
pub fn validate_weights(semantic: f32, keyword: f32) -> Result<(), RagError> {
    if !semantic.is_finite() || !keyword.is_finite() {
        return Err(config_err("blend weights must be finite"));
    }
    if !(0.0..=1.0).contains(&semantic) || !(0.0..=1.0).contains(&keyword) {
        return Err(config_err("blend weights must be within [0, 1]"));
    }
    if (semantic + keyword - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(config_err(format!(
            "blend weights must sum to 1.0 (got {})",
            semantic + keyword
        )));
    }
    Ok(())
}

fn config_err(message: impl Into<String>) -> RagError {
    RagError::Config {
        message: message.into(),
    }
}

/// Builder for [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    semantic_weight: Option<f32>,
    keyword_weight: Option<f32>,
    top_k: Option<usize>,
    expected_result_count: Option<usize>,
    quality_threshold: Option<f32>,
    top_score_floor: Option<f32>,
    max_search_attempts: Option<u32>,
    max_generation_attempts: Option<u32>,
    max_context_tokens: Option<usize>,
    min_answer_chars: Option<usize>,
    max_answer_chars: Option<usize>,
    search_timeout: Option<Duration>,
    generate_timeout: Option<Duration>,
    rewrite_timeout: Option<Duration>,
    answer_max_tokens: Option<u32>,
    rewrite_max_tokens: Option<u32>,
    temperature: Option<f32>,
    providers: Vec<ProviderSpec>,
}

impl RagConfigBuilder {
    /// Populates unset fields from `RAGPILOT_*` environment variables.
    ///
    /// Recognized keys: `RAGPILOT_SEMANTIC_WEIGHT`, `RAGPILOT_KEYWORD_WEIGHT`,
    /// `RAGPILOT_TOP_K`, `RAGPILOT_EXPECTED_RESULT_COUNT`,
    /// `RAGPILOT_QUALITY_THRESHOLD`, `RAGPILOT_TOP_SCORE_FLOOR`,
    /// `RAGPILOT_MAX_SEARCH_ATTEMPTS`, `RAGPILOT_MAX_GENERATION_ATTEMPTS`,
    /// `RAGPILOT_MAX_CONTEXT_TOKENS`, `RAGPILOT_MIN_ANSWER_CHARS`,
    /// `RAGPILOT_MAX_ANSWER_CHARS`, `RAGPILOT_SEARCH_TIMEOUT_SECS`,
    /// `RAGPILOT_GENERATE_TIMEOUT_SECS`, `RAGPILOT_REWRITE_TIMEOUT_SECS`,
    /// `RAGPILOT_ANSWER_MAX_TOKENS`, `RAGPILOT_REWRITE_MAX_TOKENS`, and
    /// `RAGPILOT_TEMPERATURE`.
    ///
    /// The provider chain is read from `RAGPILOT_PROVIDERS` (comma-separated
    /// names in fallback order); each named provider picks up
    /// `<NAME>_API_KEY`, `RAGPILOT_<NAME>_MODEL`, `RAGPILOT_<NAME>_BASE_URL`,
    /// and `RAGPILOT_<NAME>_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.from_env_source(|key| std::env::var(key).ok())
    }

    /// `from_env` against an arbitrary key lookup. Split out so layering
    /// can be tested without mutating process-global environment state.
    fn from_env_source(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(
            var: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            var(key).and_then(|v| v.parse().ok())
        }
        fn secs(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
            parse::<u64>(var, key).map(Duration::from_secs)
        }

        if self.semantic_weight.is_none() {
            self.semantic_weight = parse(&var, "RAGPILOT_SEMANTIC_WEIGHT");
        }
        if self.keyword_weight.is_none() {
            self.keyword_weight = parse(&var, "RAGPILOT_KEYWORD_WEIGHT");
        }
        if self.top_k.is_none() {
            self.top_k = parse(&var, "RAGPILOT_TOP_K");
        }
        if self.expected_result_count.is_none() {
            self.expected_result_count = parse(&var, "RAGPILOT_EXPECTED_RESULT_COUNT");
        }
        if self.quality_threshold.is_none() {
            self.quality_threshold = parse(&var, "RAGPILOT_QUALITY_THRESHOLD");
        }
        if self.top_score_floor.is_none() {
            self.top_score_floor = parse(&var, "RAGPILOT_TOP_SCORE_FLOOR");
        }
        if self.max_search_attempts.is_none() {
            self.max_search_attempts = parse(&var, "RAGPILOT_MAX_SEARCH_ATTEMPTS");
        }
        if self.max_generation_attempts.is_none() {
            self.max_generation_attempts = parse(&var, "RAGPILOT_MAX_GENERATION_ATTEMPTS");
        }
        if self.max_context_tokens.is_none() {
            self.max_context_tokens = parse(&var, "RAGPILOT_MAX_CONTEXT_TOKENS");
        }
        if self.min_answer_chars.is_none() {
            self.min_answer_chars = parse(&var, "RAGPILOT_MIN_ANSWER_CHARS");
        }
        if self.max_answer_chars.is_none() {
            self.max_answer_chars = parse(&var, "RAGPILOT_MAX_ANSWER_CHARS");
        }
        if self.search_timeout.is_none() {
            self.search_timeout = secs(&var, "RAGPILOT_SEARCH_TIMEOUT_SECS");
        }
        if self.generate_timeout.is_none() {
            self.generate_timeout = secs(&var, "RAGPILOT_GENERATE_TIMEOUT_SECS");
        }
        if self.rewrite_timeout.is_none() {
            self.rewrite_timeout = secs(&var, "RAGPILOT_REWRITE_TIMEOUT_SECS");
        }
        if self.answer_max_tokens.is_none() {
            self.answer_max_tokens = parse(&var, "RAGPILOT_ANSWER_MAX_TOKENS");
        }
        if self.rewrite_max_tokens.is_none() {
            self.rewrite_max_tokens = parse(&var, "RAGPILOT_REWRITE_MAX_TOKENS");
        }
        if self.temperature.is_none() {
            self.temperature = parse(&var, "RAGPILOT_TEMPERATURE");
        }
        if self.providers.is_empty()
            && let Some(chain) = var("RAGPILOT_PROVIDERS")
        {
            for name in chain.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let upper = name.to_uppercase();
                let mut spec = ProviderSpec::new(name);
                if let Some(key) = var(&format!("{upper}_API_KEY")) {
                    spec = spec.with_api_key(key);
                }
                if let Some(model) = var(&format!("RAGPILOT_{upper}_MODEL")) {
                    spec = spec.with_model(model);
                }
                if let Some(url) = var(&format!("RAGPILOT_{upper}_BASE_URL")) {
                    spec = spec.with_base_url(url);
                }
                if let Some(timeout) = secs(&var, &format!("RAGPILOT_{upper}_TIMEOUT_SECS")) {
                    spec = spec.with_timeout(timeout);
                }
                self.providers.push(spec);
            }
        }
        self
    }

    /// Sets both blend weights.
    #[must_use]
    pub const fn weights(mut self, semantic: f32, keyword: f32) -> Self {
        self.semantic_weight = Some(semantic);
        self.keyword_weight = Some(keyword);
        self
    }

    /// Sets the chunks retrieved per search.
    #[must_use]
    pub const fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Sets the retrieval result count target.
    #[must_use]
    pub const fn expected_result_count(mut self, n: usize) -> Self {
        self.expected_result_count = Some(n);
        self
    }

    /// Sets the quality floor.
    #[must_use]
    pub const fn quality_threshold(mut self, threshold: f32) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }

    /// Sets the top-score floor.
    #[must_use]
    pub const fn top_score_floor(mut self, floor: f32) -> Self {
        self.top_score_floor = Some(floor);
        self
    }

    /// Sets the maximum SEARCH invocations per run.
    #[must_use]
    pub const fn max_search_attempts(mut self, n: u32) -> Self {
        self.max_search_attempts = Some(n);
        self
    }

    /// Sets the maximum GENERATE invocations per run.
    #[must_use]
    pub const fn max_generation_attempts(mut self, n: u32) -> Self {
        self.max_generation_attempts = Some(n);
        self
    }

    /// Sets the context token budget.
    #[must_use]
    pub const fn max_context_tokens(mut self, n: usize) -> Self {
        self.max_context_tokens = Some(n);
        self
    }

    /// Sets the answer length bounds in characters.
    #[must_use]
    pub const fn answer_length_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_answer_chars = Some(min);
        self.max_answer_chars = Some(max);
        self
    }

    /// Sets the per-backend search timeout.
    #[must_use]
    pub const fn search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = Some(timeout);
        self
    }

    /// Sets the default per-provider generation timeout.
    #[must_use]
    pub const fn generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = Some(timeout);
        self
    }

    /// Sets the per-provider rewrite timeout.
    #[must_use]
    pub const fn rewrite_timeout(mut self, timeout: Duration) -> Self {
        self.rewrite_timeout = Some(timeout);
        self
    }

    /// Sets the maximum tokens for generated answers.
    #[must_use]
    pub const fn answer_max_tokens(mut self, n: u32) -> Self {
        self.answer_max_tokens = Some(n);
        self
    }

    /// Sets the maximum tokens for query rewrites.
    #[must_use]
    pub const fn rewrite_max_tokens(mut self, n: u32) -> Self {
        self.rewrite_max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature for answer generation.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Appends a provider to the fallback chain.
    #[must_use]
    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        self.providers.push(spec);
        self
    }

    /// Builds and validates the [`RagConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when any invariant fails: weights not
    /// summing to 1.0, non-positive attempt limits or budgets, an empty
    /// provider chain, or an unknown provider name.
    pub fn build(self) -> Result<RagConfig, RagError> {
        let config = RagConfig {
            semantic_weight: self.semantic_weight.unwrap_or(DEFAULT_SEMANTIC_WEIGHT),
            keyword_weight: self.keyword_weight.unwrap_or(DEFAULT_KEYWORD_WEIGHT),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            expected_result_count: self
                .expected_result_count
                .unwrap_or(DEFAULT_EXPECTED_RESULT_COUNT),
            quality_threshold: self.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD),
            top_score_floor: self.top_score_floor.unwrap_or(DEFAULT_TOP_SCORE_FLOOR),
            max_search_attempts: self
                .max_search_attempts
                .unwrap_or(DEFAULT_MAX_SEARCH_ATTEMPTS),
            max_generation_attempts: self
                .max_generation_attempts
                .unwrap_or(DEFAULT_MAX_GENERATION_ATTEMPTS),
            max_context_tokens: self
                .max_context_tokens
                .unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS),
            min_answer_chars: self.min_answer_chars.unwrap_or(DEFAULT_MIN_ANSWER_CHARS),
            max_answer_chars: self.max_answer_chars.unwrap_or(DEFAULT_MAX_ANSWER_CHARS),
            search_timeout: self
                .search_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS)),
            generate_timeout: self
                .generate_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_GENERATE_TIMEOUT_SECS)),
            rewrite_timeout: self
                .rewrite_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REWRITE_TIMEOUT_SECS)),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            rewrite_max_tokens: self
                .rewrite_max_tokens
                .unwrap_or(DEFAULT_REWRITE_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            providers: self.providers,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_builder() -> RagConfigBuilder {
        RagConfig::builder().provider(ProviderSpec::new("openai").with_api_key("test-key"))
    }

    #[test]
    fn test_builder_defaults() {
        let config = minimal_builder().build().unwrap_or_else(|_| unreachable!());
        assert!((config.semantic_weight - 0.7).abs() < f32::EPSILON);
        assert!((config.keyword_weight - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.expected_result_count, 3);
        assert!((config.quality_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.max_search_attempts, 3);
        assert_eq!(config.max_generation_attempts, 2);
        assert_eq!(config.max_context_tokens, 8000);
        assert_eq!(config.search_timeout, Duration::from_secs(5));
        assert_eq!(config.generate_timeout, Duration::from_secs(30));
        assert_eq!(config.rewrite_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_weight_sum_fails_at_build() {
        let result = minimal_builder().weights(0.9, 0.3).build();
        assert!(matches!(result, Err(RagError::Config { .. })));
    }

    #[test]
    fn test_weights_tolerate_float_rounding() {
        let result = minimal_builder().weights(0.6, 0.4).build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_provider_chain_fails() {
        let result = RagConfig::builder().build();
        assert!(matches!(result, Err(RagError::Config { .. })));
    }

    #[test]
    fn test_unknown_provider_rejected_at_build() {
        let result = RagConfig::builder()
            .provider(ProviderSpec::new("mystery-llm"))
            .build();
        assert!(matches!(
            result,
            Err(RagError::UnknownProvider { name }) if name == "mystery-llm"
        ));
    }

    #[test]
    fn test_zero_attempt_limits_rejected() {
        assert!(minimal_builder().max_search_attempts(0).build().is_err());
        assert!(minimal_builder().max_generation_attempts(0).build().is_err());
    }

    #[test]
    fn test_zero_budgets_rejected() {
        assert!(minimal_builder().top_k(0).build().is_err());
        assert!(minimal_builder().max_context_tokens(0).build().is_err());
    }

    #[test]
    fn test_answer_bounds_ordering_rejected() {
        assert!(minimal_builder().answer_length_bounds(100, 50).build().is_err());
    }

    #[test]
    fn test_provider_spec_defaults() {
        let spec = ProviderSpec::new("groq");
        assert_eq!(spec.model, "llama3-70b-8192");
        assert!(spec.api_key.is_none());
        let spec = ProviderSpec::new("ollama").with_base_url("http://localhost:11434");
        assert_eq!(spec.model, "llama3");
        assert_eq!(spec.base_url.as_deref(), Some("http://localhost:11434"));
    }

    fn env_fixture(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_env_populates_every_knob() {
        let env = env_fixture(&[
            ("RAGPILOT_SEMANTIC_WEIGHT", "0.6"),
            ("RAGPILOT_KEYWORD_WEIGHT", "0.4"),
            ("RAGPILOT_TOP_K", "8"),
            ("RAGPILOT_EXPECTED_RESULT_COUNT", "4"),
            ("RAGPILOT_QUALITY_THRESHOLD", "0.7"),
            ("RAGPILOT_TOP_SCORE_FLOOR", "0.4"),
            ("RAGPILOT_MAX_SEARCH_ATTEMPTS", "5"),
            ("RAGPILOT_MAX_GENERATION_ATTEMPTS", "3"),
            ("RAGPILOT_MAX_CONTEXT_TOKENS", "4000"),
            ("RAGPILOT_MIN_ANSWER_CHARS", "60"),
            ("RAGPILOT_MAX_ANSWER_CHARS", "3000"),
            ("RAGPILOT_SEARCH_TIMEOUT_SECS", "3"),
            ("RAGPILOT_GENERATE_TIMEOUT_SECS", "45"),
            ("RAGPILOT_REWRITE_TIMEOUT_SECS", "8"),
            ("RAGPILOT_ANSWER_MAX_TOKENS", "1500"),
            ("RAGPILOT_REWRITE_MAX_TOKENS", "80"),
            ("RAGPILOT_TEMPERATURE", "0.2"),
            ("RAGPILOT_PROVIDERS", "groq, ollama"),
            ("GROQ_API_KEY", "gk-test"),
            ("RAGPILOT_GROQ_MODEL", "llama-3.3-70b"),
            ("RAGPILOT_GROQ_TIMEOUT_SECS", "20"),
            ("RAGPILOT_OLLAMA_BASE_URL", "http://rag-host:11434"),
        ]);
        let config = RagConfig::builder()
            .from_env_source(env)
            .build()
            .unwrap_or_else(|_| unreachable!());

        assert!((config.semantic_weight - 0.6).abs() < f32::EPSILON);
        assert!((config.keyword_weight - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.top_k, 8);
        assert_eq!(config.expected_result_count, 4);
        assert!((config.quality_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.top_score_floor - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.max_search_attempts, 5);
        assert_eq!(config.max_generation_attempts, 3);
        assert_eq!(config.max_context_tokens, 4000);
        assert_eq!(config.min_answer_chars, 60);
        assert_eq!(config.max_answer_chars, 3000);
        assert_eq!(config.search_timeout, Duration::from_secs(3));
        assert_eq!(config.generate_timeout, Duration::from_secs(45));
        assert_eq!(config.rewrite_timeout, Duration::from_secs(8));
        assert_eq!(config.answer_max_tokens, 1500);
        assert_eq!(config.rewrite_max_tokens, 80);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].name, "groq");
        assert_eq!(config.providers[0].api_key.as_deref(), Some("gk-test"));
        assert_eq!(config.providers[0].model, "llama-3.3-70b");
        assert_eq!(config.providers[0].timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.providers[1].name, "ollama");
        assert_eq!(
            config.providers[1].base_url.as_deref(),
            Some("http://rag-host:11434")
        );
        // No per-provider timeout set for ollama: falls back to the
        // configured generate timeout at gateway construction.
        assert!(config.providers[1].timeout.is_none());
    }

    #[test]
    fn test_explicit_builder_values_beat_env() {
        let env = env_fixture(&[
            ("RAGPILOT_TOP_K", "8"),
            ("RAGPILOT_QUALITY_THRESHOLD", "0.9"),
            ("RAGPILOT_PROVIDERS", "ollama"),
        ]);
        let config = RagConfig::builder()
            .top_k(2)
            .provider(ProviderSpec::new("openai").with_api_key("k"))
            .from_env_source(env)
            .build()
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.top_k, 2);
        // Env fills what the builder left unset.
        assert!((config.quality_threshold - 0.9).abs() < f32::EPSILON);
        // An explicit provider chain suppresses the env chain entirely.
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "openai");
    }

    #[test]
    fn test_env_unparseable_value_falls_back_to_default() {
        let env = env_fixture(&[
            ("RAGPILOT_TOP_K", "many"),
            ("RAGPILOT_PROVIDERS", "ollama"),
        ]);
        let config = RagConfig::builder()
            .from_env_source(env)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_validate_weights_rejects_out_of_range() {
        assert!(validate_weights(1.2, -0.2).is_err());
        assert!(validate_weights(f32::NAN, 0.5).is_err());
        assert!(validate_weights(0.5, 0.5).is_ok());
    }
}
