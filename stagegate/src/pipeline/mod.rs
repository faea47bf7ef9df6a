//! Stage registry and the engine that runs it.
//!
//! This module provides:
//! - Stage definitions with optional rejection or score gates
//! - A validated, ordered stage registry
//! - Engine configuration loaded from JSON or the environment
//! - The pipeline engine: submit, cancel, checkpoint, and resume

mod config;
mod definition;
mod engine;
mod registry;


pub use config::{
    EngineConfig, DEFAULT_CHECKPOINT_SLOT, DEFAULT_KNOWLEDGE_TOP_K, DEFAULT_SCORE_THRESHOLD,
};
pub use definition::{CriticDefinition, GateKind, ScoreGate, StageDefinition};
pub use engine::{CancelledRun, PipelineEngine, PipelineEngineBuilder, RunOutcome};
pub use registry::StageRegistry;
