//! The orchestration state machine.
//!
//! A run walks a fixed phase graph:
//!
//! ```text
//! PLAN -> SEARCH -> CHECK_RETRIEVAL -+-> ASSEMBLE -> GENERATE -> CHECK_ANSWER -+-> FINALIZE
//!           ^                        |                   ^                     |
//!           +------- REFINE <-------+                   +---------------------+
//! ```
//!
//! Quality checks gate the two loops: a weak retrieval triggers a query
//! rewrite and another search, a weak answer triggers a regeneration with a
//! stricter prompt. Both loops are bounded by attempt limits, so a run
//! always terminates. Recoverable failures (one backend down, a failed
//! rewrite) degrade the run; fatal ones (both backends down with nothing
//! retrieved yet, every provider exhausted) abort it with a typed error.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::RagConfig;
use crate::context::{self, AssembledContext};
use crate::error::RagError;
use crate::gateway::ProviderGateway;
use crate::index::{ChunkStore, KeywordIndex, SemanticIndex};
use crate::prompt::build_answer_prompt;
use crate::quality::QualityEvaluator;
use crate::retriever::{BlendWeights, HybridRetriever};
use crate::types::{
    GenerationResult, QualityMetrics, Query, RetrievalResult, RunOptions, RunReport,
};

/// Phases of an orchestration run, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Input validation and option resolution.
    Plan,
    /// Hybrid retrieval with the current query.
    Search,
    /// Retrieval quality gate.
    CheckRetrieval,
    /// Query rewrite after a weak retrieval.
    Refine,
    /// Context packing under the token budget.
    Assemble,
    /// Answer generation through the provider gateway.
    Generate,
    /// Answer quality gate.
    CheckAnswer,
    /// Report construction.
    Finalize,
    /// Terminal failure.
    Aborted,
}

impl Phase {
    const fn name(self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Search => "SEARCH",
            Self::CheckRetrieval => "CHECK_RETRIEVAL",
            Self::Refine => "REFINE",
            Self::Assemble => "ASSEMBLE",
            Self::Generate => "GENERATE",
            Self::CheckAnswer => "CHECK_ANSWER",
            Self::Finalize => "FINALIZE",
            Self::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-run knobs after merging [`RunOptions`] with configuration.
struct ResolvedOptions {
    k: usize,
    weights: Option<BlendWeights>,
    max_search_attempts: u32,
    max_generation_attempts: u32,
    max_context_tokens: usize,
}

/// Mutable state threaded through one run. Created fresh per run and
/// consumed by report construction; nothing outlives the call.
struct RunState {
    original: Query,
    current: Query,
    last: Option<RetrievalResult>,
    best: Option<(RetrievalResult, QualityMetrics)>,
    context: Option<AssembledContext>,
    answer: Option<GenerationResult>,
    answer_metrics: Option<QualityMetrics>,
    metrics_history: Vec<QualityMetrics>,
    search_attempts: u32,
    generation_attempts: u32,
    fallback_used: bool,
    search_duration_ms: u64,
    trace: Vec<String>,
}

impl RunState {
    fn new(original: Query) -> Self {
        Self {
            current: original.clone(),
            original,
            last: None,
            best: None,
            context: None,
            answer: None,
            answer_metrics: None,
            metrics_history: Vec::new(),
            search_attempts: 0,
            generation_attempts: 0,
            fallback_used: false,
            search_duration_ms: 0,
            trace: Vec::new(),
        }
    }

    fn trace(&mut self, phase: Phase, detail: impl AsRef<str>) {
        self.trace.push(format!("{phase}: {}", detail.as_ref()));
    }
}

/// The orchestration engine: retrieval, quality gating, and generation
/// behind a single [`run`](Self::run) entry point.
#[derive(Debug)]
pub struct Orchestrator {
    retriever: HybridRetriever,
    gateway: ProviderGateway,
    evaluator: QualityEvaluator,
    config: RagConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over pre-built components.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the configuration is invalid.
    pub fn new(
        retriever: HybridRetriever,
        gateway: ProviderGateway,
        config: RagConfig,
    ) -> Result<Self, RagError> {
        config.validate()?;
        let evaluator = QualityEvaluator::new(&config);
        Ok(Self {
            retriever,
            gateway,
            evaluator,
            config,
        })
    }

    /// Creates an orchestrator wired from configuration: the retriever over
    /// the given index backends, the gateway over the configured provider
    /// chain.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] for invalid configuration or a missing
    /// provider credential, and [`RagError::UnknownProvider`] for an
    /// unregistered provider name.
    pub fn from_config(
        semantic: Arc<dyn SemanticIndex>,
        keyword: Arc<dyn KeywordIndex>,
        store: Arc<dyn ChunkStore>,
        config: RagConfig,
    ) -> Result<Self, RagError> {
        let retriever = HybridRetriever::from_config(semantic, keyword, store, &config)?;
        let gateway = ProviderGateway::new(&config)?;
        Self::new(retriever, gateway, config)
    }

    /// Runs the full orchestration for one query.
    ///
    /// With `options.use_agentic == false` the quality loops are skipped:
    /// one search, one generation, no refinement.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for an empty query or malformed
    ///   overrides, before any work is done.
    /// - [`RagError::Retrieval`] when both search backends fail with no
    ///   prior results to fall back on.
    /// - [`RagError::Generation`] when every provider fails on an answer
    ///   generation call.
    pub async fn run(&self, query: &str, options: &RunOptions) -> Result<RunReport, RagError> {
        let started = Instant::now();
        let text = query.trim();
        if text.is_empty() {
            return Err(RagError::InvalidInput {
                message: "query must not be empty".to_string(),
            });
        }
        let resolved = self.resolve_options(options)?;

        info!(query_len = text.len(), agentic = options.use_agentic, "run started");
        let mut state = RunState::new(Query::new(text));
        state.trace(
            Phase::Plan,
            format!("agentic={}, k={}", options.use_agentic, resolved.k),
        );

        if options.use_agentic {
            self.drive(&mut state, &resolved).await?;
        } else {
            self.single_shot(&mut state, &resolved).await?;
        }

        let report = finalize(state, started);
        info!(
            search_attempts = report.search_attempts,
            generation_attempts = report.generation_attempts,
            provider = %report.provider_used,
            total_ms = report.total_duration_ms,
            "run complete"
        );
        Ok(report)
    }

    /// Merges per-run overrides with configuration and validates them.
    fn resolve_options(&self, options: &RunOptions) -> Result<ResolvedOptions, RagError> {
        let invalid = |message: &str| RagError::InvalidInput {
            message: message.to_string(),
        };

        let weights = match (options.semantic_weight, options.keyword_weight) {
            (None, None) => None,
            (Some(semantic), Some(keyword)) => Some(BlendWeights::new(semantic, keyword)?),
            _ => return Err(invalid("weight overrides must be provided as a pair")),
        };

        let k = options.k.unwrap_or(self.config.top_k);
        let max_search_attempts = options
            .max_search_attempts
            .unwrap_or(self.config.max_search_attempts);
        let max_generation_attempts = options
            .max_generation_attempts
            .unwrap_or(self.config.max_generation_attempts);
        let max_context_tokens = options
            .max_context_tokens
            .unwrap_or(self.config.max_context_tokens);

        if k == 0 {
            return Err(invalid("k override must be positive"));
        }
        if max_search_attempts == 0 || max_generation_attempts == 0 {
            return Err(invalid("attempt limit overrides must be positive"));
        }
        if max_context_tokens == 0 {
            return Err(invalid("context budget override must be positive"));
        }

        Ok(ResolvedOptions {
            k,
            weights,
            max_search_attempts,
            max_generation_attempts,
            max_context_tokens,
        })
    }

    /// Drives the agentic phase loop to completion or abort.
    async fn drive(&self, state: &mut RunState, opts: &ResolvedOptions) -> Result<(), RagError> {
        let mut phase = Phase::Search;
        loop {
            phase = match phase {
                Phase::Search => self.search_phase(state, opts).await?,
                Phase::CheckRetrieval => self.check_retrieval_phase(state, opts),
                Phase::Refine => self.refine_phase(state).await,
                Phase::Assemble => assemble_phase(state, opts),
                Phase::Generate => self.generate_phase(state).await?,
                Phase::CheckAnswer => self.check_answer_phase(state, opts),
                Phase::Finalize => {
                    state.trace(Phase::Finalize, "run complete");
                    return Ok(());
                }
                // Plan runs before the loop; Aborted exits via `?` above.
                Phase::Plan | Phase::Aborted => unreachable!("phase not part of the loop"),
            };
        }
    }

    /// Degraded single-shot mode: one search, one generation, no loops.
    async fn single_shot(
        &self,
        state: &mut RunState,
        opts: &ResolvedOptions,
    ) -> Result<(), RagError> {
        let mut phase = self.search_phase(state, opts).await?;
        if phase == Phase::CheckRetrieval {
            let result = state.last.take().unwrap_or_default();
            let metrics = self.evaluator.evaluate_retrieval(&result);
            state.trace(
                Phase::CheckRetrieval,
                format!("score {:.2} (recorded, no refinement)", metrics.score),
            );
            state.metrics_history.push(metrics.clone());
            state.best = Some((result, metrics));
            phase = Phase::Assemble;
        }
        debug_assert_eq!(phase, Phase::Assemble);

        assemble_phase(state, opts);
        self.generate_phase(state).await?;

        let chunks_used = state.context.as_ref().map_or(0, |c| c.chunks_used.len());
        let answer_text = state.answer.as_ref().map_or("", |r| r.text.as_str());
        let metrics = self.evaluator.evaluate_answer(answer_text, chunks_used);
        state.trace(
            Phase::CheckAnswer,
            format!("score {:.2} (recorded, no regeneration)", metrics.score),
        );
        state.metrics_history.push(metrics.clone());
        state.answer_metrics = Some(metrics);
        state.trace(Phase::Finalize, "run complete");
        Ok(())
    }

    async fn search_phase(
        &self,
        state: &mut RunState,
        opts: &ResolvedOptions,
    ) -> Result<Phase, RagError> {
        state.search_attempts += 1;
        let attempt = state.search_attempts;
        let search_started = Instant::now();

        let outcome = match opts.weights {
            Some(weights) => {
                self.retriever
                    .search_weighted(&state.current.text, opts.k, weights)
                    .await
            }
            None => self.retriever.search(&state.current.text, opts.k).await,
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            state.search_duration_ms += search_started.elapsed().as_millis() as u64;
        }

        match outcome {
            Ok(result) => {
                state.trace(
                    Phase::Search,
                    format!("attempt {attempt} returned {} chunks", result.len()),
                );
                if let Some(reason) = &result.semantic_error {
                    state.trace(Phase::Search, format!("semantic backend down: {reason}"));
                }
                if let Some(reason) = &result.keyword_error {
                    state.trace(Phase::Search, format!("keyword backend down: {reason}"));
                }
                state.last = Some(result);
                Ok(Phase::CheckRetrieval)
            }
            Err(err) if state.best.is_some() => {
                // A later search failing is recoverable: answer from the
                // best results already in hand.
                warn!(attempt, error = %err, "search failed, using best prior results");
                state.trace(
                    Phase::Search,
                    format!("attempt {attempt} failed ({err}), keeping prior results"),
                );
                Ok(Phase::Assemble)
            }
            Err(err) => {
                state.trace(Phase::Aborted, err.to_string());
                Err(err)
            }
        }
    }

    fn check_retrieval_phase(&self, state: &mut RunState, opts: &ResolvedOptions) -> Phase {
        let result = state.last.take().unwrap_or_default();
        let metrics = self.evaluator.evaluate_retrieval(&result);
        state.trace(
            Phase::CheckRetrieval,
            format!(
                "score {:.2}, threshold {:.2}, flags {:?}",
                metrics.score, self.config.quality_threshold, metrics.reason_codes
            ),
        );
        state.metrics_history.push(metrics.clone());

        let improved = state
            .best
            .as_ref()
            .is_none_or(|(_, best)| metrics.score > best.score);
        let passed = metrics.passes(self.config.quality_threshold);
        if improved {
            state.best = Some((result, metrics));
        }

        if passed || state.search_attempts >= opts.max_search_attempts {
            Phase::Assemble
        } else {
            Phase::Refine
        }
    }

    async fn refine_phase(&self, state: &mut RunState) -> Phase {
        let reasons = state
            .metrics_history
            .last()
            .map(|m| m.reason_codes.clone())
            .unwrap_or_default();

        match self.gateway.rewrite(&state.current.text, &reasons).await {
            Ok(rewrite) if rewrite.text != state.current.text => {
                state.fallback_used |= rewrite.fallback_used;
                state.trace(
                    Phase::Refine,
                    format!("query rewritten via {}", rewrite.provider_used),
                );
                state.current = state.current.refine(rewrite.text);
                Phase::Search
            }
            Ok(_) => {
                // Re-running an identical query cannot improve anything.
                state.trace(Phase::Refine, "rewrite unchanged, keeping current results");
                Phase::Assemble
            }
            Err(err) => {
                // A rewrite is an optimization; its failure never fails
                // the run.
                warn!(error = %err, "query rewrite failed, keeping current results");
                state.trace(Phase::Refine, format!("rewrite failed ({err})"));
                Phase::Assemble
            }
        }
    }

    async fn generate_phase(&self, state: &mut RunState) -> Result<Phase, RagError> {
        state.generation_attempts += 1;
        let retry = state.generation_attempts > 1;
        let context_text = state
            .context
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| c.text.as_str());
        // Always the original query: refined queries steer retrieval, not
        // the answer.
        let prompt = build_answer_prompt(&state.original.text, context_text, retry);

        match self.gateway.generate(&prompt).await {
            Ok(result) => {
                state.fallback_used |= result.fallback_used;
                state.trace(
                    Phase::Generate,
                    format!(
                        "attempt {} answered by {} in {}ms",
                        state.generation_attempts, result.provider_used, result.latency_ms
                    ),
                );
                if !result.failures.is_empty() {
                    let skipped: Vec<&str> =
                        result.failures.iter().map(|f| f.provider.as_str()).collect();
                    state.trace(
                        Phase::Generate,
                        format!("fell back past {}", skipped.join(", ")),
                    );
                }
                state.answer = Some(result);
                Ok(Phase::CheckAnswer)
            }
            Err(err) => {
                state.trace(Phase::Aborted, err.to_string());
                Err(err)
            }
        }
    }

    fn check_answer_phase(&self, state: &mut RunState, opts: &ResolvedOptions) -> Phase {
        let chunks_used = state.context.as_ref().map_or(0, |c| c.chunks_used.len());
        let answer_text = state.answer.as_ref().map_or("", |r| r.text.as_str());
        let metrics = self.evaluator.evaluate_answer(answer_text, chunks_used);
        state.trace(
            Phase::CheckAnswer,
            format!(
                "score {:.2}, threshold {:.2}, flags {:?}",
                metrics.score, self.config.quality_threshold, metrics.reason_codes
            ),
        );
        state.metrics_history.push(metrics.clone());

        let passed = metrics.passes(self.config.quality_threshold);
        state.answer_metrics = Some(metrics);
        if passed || state.generation_attempts >= opts.max_generation_attempts {
            Phase::Finalize
        } else {
            Phase::Generate
        }
    }
}

fn assemble_phase(state: &mut RunState, opts: &ResolvedOptions) -> Phase {
    let result = state
        .best
        .as_ref()
        .map(|(r, _)| r.clone())
        .unwrap_or_default();
    let assembled = context::assemble(&result, opts.max_context_tokens);
    state.trace(
        Phase::Assemble,
        format!(
            "{} chunks, {} tokens{}",
            assembled.chunks_used.len(),
            assembled.total_tokens,
            if assembled.truncated { ", truncated" } else { "" }
        ),
    );
    state.context = Some(assembled);
    Phase::Generate
}

/// Packages the terminal state into the run report.
fn finalize(state: RunState, started: Instant) -> RunReport {
    let zero = || QualityMetrics {
        score: 0.0,
        reason_codes: Vec::new(),
    };
    let retrieval_quality = state.best.map_or_else(zero, |(_, m)| m);
    let answer_quality = state.answer_metrics.unwrap_or_else(zero);
    let (answer, provider_used, answer_fallback) = state.answer.map_or_else(
        || (String::new(), String::new(), false),
        |r| (r.text, r.provider_used, r.fallback_used),
    );
    let (chunks_used, context_truncated) = state.context.map_or_else(
        || (Vec::new(), false),
        |c| (c.chunks_used, c.truncated),
    );

    #[allow(clippy::cast_possible_truncation)]
    let total_duration_ms = started.elapsed().as_millis() as u64;

    RunReport {
        query: state.original.text,
        answer,
        refined_query: (state.current.generation > 0).then_some(state.current.text),
        retrieval_quality,
        answer_quality,
        metrics_history: state.metrics_history,
        chunks_used,
        search_attempts: state.search_attempts,
        generation_attempts: state.generation_attempts,
        provider_used,
        fallback_used: state.fallback_used || answer_fallback,
        context_truncated,
        search_duration_ms: state.search_duration_ms,
        total_duration_ms,
        trace: state.trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSpec;
    use crate::index::IndexHit;
    use crate::prompt::NO_CONTEXT_MARKER;
    use crate::provider::{GenerationProvider, GenerationRequest};
    use crate::types::{Chunk, ReasonCode};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend returning a scripted response per call; the last entry
    /// repeats once the script runs out.
    struct SeqBackend {
        responses: Vec<Result<Vec<IndexHit>, String>>,
        calls: AtomicUsize,
    }

    impl SeqBackend {
        fn new(responses: Vec<Result<Vec<IndexHit>, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self) -> Result<Vec<IndexHit>, RagError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.responses.len() - 1);
            self.responses[index].clone().map_err(|message| RagError::Index {
                backend: "test".to_string(),
                message,
            })
        }
    }

    #[async_trait]
    impl SemanticIndex for SeqBackend {
        async fn search(&self, _q: &str, _k: usize) -> Result<Vec<IndexHit>, RagError> {
            self.next()
        }
    }

    #[async_trait]
    impl KeywordIndex for SeqBackend {
        async fn search(&self, _q: &str, _k: usize) -> Result<Vec<IndexHit>, RagError> {
            self.next()
        }
    }

    struct MapStore(HashMap<String, Chunk>);

    #[async_trait]
    impl ChunkStore for MapStore {
        async fn fetch(&self, ids: &[String]) -> Result<Vec<Chunk>, RagError> {
            Ok(ids.iter().filter_map(|id| self.0.get(id).cloned()).collect())
        }
    }

    /// Provider returning scripted responses in order, recording every
    /// prompt it receives. The last response repeats when exhausted.
    struct SeqProvider {
        responses: Vec<Result<String, String>>,
        calls: AtomicUsize,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl SeqProvider {
        fn boxed(responses: Vec<Result<&'static str, &'static str>>) -> Box<Self> {
            Box::new(Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                calls: AtomicUsize::new(0),
                prompts: Arc::new(Mutex::new(Vec::new())),
            })
        }

        /// Shared handle to the recorded prompts, usable after the provider
        /// has been moved into a gateway.
        fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.prompts)
        }
    }

    #[async_trait]
    impl GenerationProvider for SeqProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(request.prompt.clone());
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.responses.len() - 1);
            self.responses[index].clone().map_err(|message| RagError::Provider {
                provider: "scripted".to_string(),
                message,
            })
        }
    }

    const GOOD_ANSWER: &str = "Every employee receives thirty days of paid vacation per year, \
        accruing monthly, with manager approval required for absences longer than two weeks.";

    fn hit(id: &str, raw: f32) -> IndexHit {
        IndexHit {
            chunk_id: id.to_string(),
            raw_score: raw,
        }
    }

    fn store_for(ids: &[&str]) -> Arc<MapStore> {
        Arc::new(MapStore(
            ids.iter()
                .map(|id| {
                    (
                        (*id).to_string(),
                        Chunk {
                            id: (*id).to_string(),
                            document_id: "doc".to_string(),
                            text: format!("content of chunk {id}"),
                            token_count: 50,
                        },
                    )
                })
                .collect(),
        ))
    }

    fn config() -> RagConfig {
        RagConfig::builder()
            .provider(ProviderSpec::new("ollama"))
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn orchestrator(
        semantic: Arc<SeqBackend>,
        keyword: Arc<SeqBackend>,
        store: Arc<MapStore>,
        provider: Box<SeqProvider>,
    ) -> Orchestrator {
        let config = config();
        let retriever = HybridRetriever::from_config(semantic, keyword, store, &config)
            .unwrap_or_else(|_| unreachable!());
        let gateway = ProviderGateway::with_providers(vec![provider], &config);
        Orchestrator::new(retriever, gateway, config).unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn test_happy_path_single_pass() {
        // Strong retrieval: 3 chunks, top chunk in both backends.
        let semantic = SeqBackend::new(vec![Ok(vec![
            hit("a", 0.9),
            hit("b", 0.6),
            hit("c", 0.3),
        ])]);
        let keyword = SeqBackend::new(vec![Ok(vec![hit("a", 5.0), hit("b", 1.0)])]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a", "b", "c"]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );

        let report = orch
            .run("What is the vacation policy?", &RunOptions::default())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(report.search_attempts, 1);
        assert_eq!(report.generation_attempts, 1);
        assert_eq!(report.answer, GOOD_ANSWER);
        assert!(report.refined_query.is_none());
        assert!(!report.fallback_used);
        assert!(!report.context_truncated);
        assert_eq!(report.chunks_used.len(), 3);
        assert!(report.retrieval_quality.passes(0.6));
        assert!(report.answer_quality.passes(0.6));
        // 1 retrieval check + 1 answer check.
        assert_eq!(report.metrics_history.len(), 2);
        assert!(report.trace.iter().any(|t| t.starts_with("FINALIZE")));
    }

    #[tokio::test]
    async fn test_weak_retrieval_triggers_refinement() {
        // First search: one semantic-only hit. Normalizes to 1.0, blends to
        // 0.7, retrieval score 0.5/3 + 0.35 = 0.52 < 0.6. Second search
        // (after rewrite) is strong.
        let semantic = SeqBackend::new(vec![
            Ok(vec![hit("a", 0.4)]),
            Ok(vec![hit("a", 0.9), hit("b", 0.6), hit("c", 0.3)]),
        ]);
        let keyword = SeqBackend::new(vec![
            Ok(vec![]),
            Ok(vec![hit("a", 5.0)]),
        ]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a", "b", "c"]),
            SeqProvider::boxed(vec![Ok("paid vacation day allowance policy"), Ok(GOOD_ANSWER)]),
        );

        let report = orch
            .run("ferias", &RunOptions::default())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(report.search_attempts, 2);
        assert_eq!(report.generation_attempts, 1);
        assert_eq!(
            report.refined_query.as_deref(),
            Some("paid vacation day allowance policy")
        );
        // 2 retrieval checks + 1 answer check.
        assert_eq!(report.metrics_history.len(), 3);
        assert!(report.trace.iter().any(|t| t.starts_with("REFINE")));
    }

    #[tokio::test]
    async fn test_search_attempts_bounded() {
        // Retrieval stays weak forever; rewrites keep producing new queries.
        let semantic = SeqBackend::new(vec![Ok(vec![hit("a", 0.4)])]);
        let keyword = SeqBackend::new(vec![Ok(vec![])]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a"]),
            SeqProvider::boxed(vec![
                Ok("rewrite one"),
                Ok("rewrite two"),
                Ok(GOOD_ANSWER),
            ]),
        );

        let report = orch
            .run("hopeless query", &RunOptions::default())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        // Default limit is 3 searches; the run proceeds with the best
        // result instead of looping further.
        assert_eq!(report.search_attempts, 3);
        assert_eq!(report.refined_query.as_deref(), Some("rewrite two"));
        assert!(!report.answer.is_empty());
        assert!(!report.retrieval_quality.passes(0.6));
    }

    #[tokio::test]
    async fn test_both_backends_failing_aborts() {
        let semantic = SeqBackend::new(vec![Err("semantic down".to_string())]);
        let keyword = SeqBackend::new(vec![Err("keyword down".to_string())]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&[]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );

        let err = orch
            .run("anything", &RunOptions::default())
            .await
            .err()
            .unwrap_or_else(|| unreachable!());
        assert!(matches!(err, RagError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_degraded_retrieval_still_answers() {
        let semantic = SeqBackend::new(vec![Err("connection refused".to_string())]);
        let keyword = SeqBackend::new(vec![Ok(vec![
            hit("a", 9.0),
            hit("b", 6.0),
            hit("c", 3.0),
        ])]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a", "b", "c"]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );

        let report = orch
            .run("vacation policy", &RunOptions::default())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(report.answer, GOOD_ANSWER);
        assert_eq!(report.chunks_used.len(), 3);
        assert!(
            report
                .trace
                .iter()
                .any(|t| t.contains("semantic backend down"))
        );
    }

    #[tokio::test]
    async fn test_empty_retrieval_regenerates_weak_answer() {
        // No results at all: the first answer is too short without context
        // and triggers one regeneration with the stricter prompt.
        let semantic = SeqBackend::new(vec![Ok(vec![])]);
        let keyword = SeqBackend::new(vec![Ok(vec![])]);
        let provider = SeqProvider::boxed(vec![
            Ok("No."),
            Ok("I do not have sufficient information in the document corpus to answer this \
                question; please rephrase it or contact the responsible team."),
        ]);
        let orch = orchestrator(semantic, keyword, store_for(&[]), provider);

        let options = RunOptions {
            // A single search: empty retrieval cannot improve by rewriting
            // in this scenario, and the scripted provider only serves
            // generation responses.
            max_search_attempts: Some(1),
            ..RunOptions::default()
        };
        let report = orch
            .run("unknown topic", &options)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(report.generation_attempts, 2);
        assert!(report.chunks_used.is_empty());
        assert!(report.answer_quality.has(ReasonCode::NoContextUsed));
        assert!(report.answer.contains("sufficient information"));
    }

    #[tokio::test]
    async fn test_no_context_prompt_and_retry_instruction() {
        let semantic = SeqBackend::new(vec![Ok(vec![])]);
        let keyword = SeqBackend::new(vec![Ok(vec![])]);
        let provider = SeqProvider::boxed(vec![Ok("No."), Ok(GOOD_ANSWER)]);
        let prompt_log = provider.prompt_log();
        let orch = orchestrator(semantic, keyword, store_for(&[]), provider);

        let options = RunOptions {
            max_search_attempts: Some(1),
            ..RunOptions::default()
        };
        orch.run("unknown topic", &options)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        let prompts = prompt_log.lock().unwrap_or_else(|_| unreachable!());
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains(NO_CONTEXT_MARKER));
        assert!(!prompts[0].contains("Be more thorough"));
        assert!(prompts[1].contains("Be more thorough"));
        // Regeneration reuses the original query, never a refined one.
        assert!(prompts[1].contains("Question: unknown topic"));
    }

    #[tokio::test]
    async fn test_single_shot_mode_skips_loops() {
        // Weak retrieval that would trigger refinement in agentic mode.
        let semantic = SeqBackend::new(vec![Ok(vec![hit("a", 0.4)])]);
        let keyword = SeqBackend::new(vec![Ok(vec![])]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a"]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );

        let options = RunOptions {
            use_agentic: false,
            ..RunOptions::default()
        };
        let report = orch
            .run("ferias", &options)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(report.search_attempts, 1);
        assert_eq!(report.generation_attempts, 1);
        assert!(report.refined_query.is_none());
        assert!(!report.trace.iter().any(|t| t.starts_with("REFINE")));
        // Both quality checks are still recorded for observability.
        assert_eq!(report.metrics_history.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let orch = orchestrator(
            SeqBackend::new(vec![Ok(vec![])]),
            SeqBackend::new(vec![Ok(vec![])]),
            store_for(&[]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );
        let err = orch
            .run("   ", &RunOptions::default())
            .await
            .err()
            .unwrap_or_else(|| unreachable!());
        assert!(matches!(err, RagError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_weight_override_rejected() {
        let orch = orchestrator(
            SeqBackend::new(vec![Ok(vec![])]),
            SeqBackend::new(vec![Ok(vec![])]),
            store_for(&[]),
            SeqProvider::boxed(vec![Ok(GOOD_ANSWER)]),
        );
        let options = RunOptions {
            semantic_weight: Some(0.5),
            ..RunOptions::default()
        };
        let err = orch
            .run("query", &options)
            .await
            .err()
            .unwrap_or_else(|| unreachable!());
        assert!(matches!(err, RagError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_with_attempts() {
        let semantic = SeqBackend::new(vec![Ok(vec![hit("a", 0.9), hit("b", 0.5), hit("c", 0.1)])]);
        let keyword = SeqBackend::new(vec![Ok(vec![hit("a", 1.0)])]);
        let orch = orchestrator(
            semantic,
            keyword,
            store_for(&["a", "b", "c"]),
            SeqProvider::boxed(vec![Err("HTTP 503")]),
        );

        let err = orch
            .run("query", &RunOptions::default())
            .await
            .err()
            .unwrap_or_else(|| unreachable!());
        match err {
            RagError::Generation { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].reason.contains("HTTP 503"));
            }
            other => unreachable!("expected Generation error, got {other}"),
        }
    }
}
