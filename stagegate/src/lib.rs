//! # Stagegate
//!
//! Gated, checkpointed stage sequencing for role-based creative production.
//!
//! Stagegate turns a short seed brief into a finished artifact by running an
//! ordered list of stages, each one a call to a reasoning gateway under a
//! different role. Around those calls it provides:
//!
//! - **Signal extraction**: deterministic rejection markers and critique scores
//! - **Gates**: a rejection gate with a bounded pivot loop, and a score gate
//!   with a bounded revision loop that keeps the best attempt
//! - **Prompt composition**: prior outputs, locked constraints, reference
//!   material and standing directives assembled into each task
//! - **Checkpointing**: a snapshot after every stage, resumable strictly
//!   after the last completed one
//! - **Cancellation**: a shared token observed on both edges of every call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegate::prelude::*;
//!
//! let engine = PipelineEngine::builder()
//!     .registry(StageRegistry::creative_production()?)
//!     .gateway(Arc::new(HttpGateway::new(HttpGatewayConfig::new(endpoint, model))?))
//!     .checkpoint_store(Arc::new(FileCheckpointStore::new(".stagegate")))
//!     .build()?;
//!
//! let outcome = engine
//!     .submit_or_resume(brief, RunOptions::new().with_audience("commuters"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checkpoint;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod gates;
pub mod gateway;
pub mod history;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod signals;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{
        Checkpoint, CheckpointManager, CheckpointStore, FileCheckpointStore,
        InMemoryCheckpointStore,
    };
    pub use crate::context::{
        DerivedConstraints, ExhaustionPolicy, ExtractionRule, RunContext, RunOptions,
    };
    pub use crate::core::{
        FinalArtifact, GateDecision, GateState, RevisionAttempt, RunStatus, UnresolvedGate,
    };
    pub use crate::errors::{
        CheckpointError, ConfigError, GatewayError, PipelineValidationError, StagegateError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::gateway::{HttpGateway, HttpGatewayConfig};
    pub use crate::gateway::{
        InvocationOptions, KnowledgeRetriever, KnowledgeSnippet, ReasoningGateway,
    };
    pub use crate::history::{InMemoryRunHistory, JsonlRunHistory, RunHistorySink, RunRecord};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        CriticDefinition, EngineConfig, PipelineEngine, RunOutcome, StageDefinition,
        StageRegistry,
    };
    pub use crate::prompt::{FnPrompt, PromptBuilder, TemplatePrompt};
    pub use crate::signals::{extract_signal, RejectionCategory, Signal, SignalExtractor};
}
