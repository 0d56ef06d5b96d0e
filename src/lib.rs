//! Agentic retrieval-augmented generation engine.
//!
//! Orchestrates hybrid search, quality gating, and LLM answer generation
//! over a pre-built document index. Retrieval blends semantic and keyword
//! scores; deterministic quality checks decide whether to refine the query
//! and search again, regenerate the answer, or finish. Generation runs
//! through an ordered provider fallback chain.
//!
//! # Architecture
//!
//! ```text
//! User query → Orchestrator
//!   ├── HybridRetriever (semantic ∥ keyword → normalize, blend, dedup)
//!   ├── QualityEvaluator (retrieval gate → refine loop, bounded)
//!   │     └── ProviderGateway::rewrite (query rewrite)
//!   ├── assemble (greedy context packing under token budget)
//!   ├── ProviderGateway::generate (ordered fallback chain)
//!   ├── QualityEvaluator (answer gate → regenerate loop, bounded)
//!   └── RunReport (answer + metrics + trace)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragpilot::{Orchestrator, ProviderSpec, RagConfig, RunOptions};
//! # use ragpilot::{ChunkStore, KeywordIndex, SemanticIndex};
//! # async fn run(
//! #     semantic: Arc<dyn SemanticIndex>,
//! #     keyword: Arc<dyn KeywordIndex>,
//! #     store: Arc<dyn ChunkStore>,
//! # ) -> Result<(), ragpilot::RagError> {
//! let config = RagConfig::builder()
//!     .provider(ProviderSpec::new("openai").with_api_key("sk-..."))
//!     .provider(ProviderSpec::new("ollama"))
//!     .build()?;
//! let engine = Orchestrator::from_config(semantic, keyword, store, config)?;
//! let report = engine.run("What is the vacation policy?", &RunOptions::default()).await?;
//! println!("{} (via {})", report.answer, report.provider_used);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod index;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod quality;
pub mod retriever;
pub mod types;

// Re-export key types
pub use config::{ProviderSpec, RagConfig, RagConfigBuilder};
pub use context::{AssembledContext, assemble};
pub use error::{ProviderFailure, RagError};
pub use gateway::ProviderGateway;
pub use index::{ChunkStore, IndexHit, KeywordIndex, SemanticIndex};
pub use orchestrator::{Orchestrator, Phase};
pub use provider::{GenerationProvider, GenerationRequest};
pub use quality::QualityEvaluator;
pub use retriever::{BlendWeights, HybridRetriever};
pub use types::{
    Chunk, GenerationResult, QualityMetrics, Query, ReasonCode, RetrievalResult, RunOptions,
    RunReport, ScoredChunk,
};
