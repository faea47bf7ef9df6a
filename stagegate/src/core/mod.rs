//! Core value types shared across the engine.
//!
//! This module provides:
//! - Run and stage status enums
//! - Revision attempts recorded by score gates
//! - Unresolved gate annotations and the final artifact

mod artifact;
mod attempt;
mod status;

pub use artifact::{FinalArtifact, GateState, UnresolvedGate};
pub use attempt::{PivotAttempt, RevisionAttempt};
pub use status::{GateDecision, RunStatus};
