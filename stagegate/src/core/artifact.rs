//! Final artifacts and unresolved gate annotations.

use super::RevisionAttempt;
use crate::signals::RejectionCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// The state a gate was left in when its loop ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateState {
    /// The stage kept returning a rejection marker.
    Rejected {
        /// Category of the last rejection seen.
        category: RejectionCategory,
    },
    /// No critique reached the score threshold.
    BelowThreshold {
        /// Highest score seen across attempts.
        best_score: Option<u8>,
        /// The threshold that was not met.
        threshold: u8,
    },
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { category } => write!(f, "rejected ({category})"),
            Self::BelowThreshold {
                best_score: Some(score),
                threshold,
            } => write!(f, "best score {score} below threshold {threshold}"),
            Self::BelowThreshold {
                best_score: None,
                threshold,
            } => write!(f, "no score reached threshold {threshold}"),
        }
    }
}

/// A gate that was passed by policy rather than by its signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedGate {
    /// The gated stage.
    pub stage_id: String,
    /// Attempts spent before giving up.
    pub attempts: u32,
    /// Gate state at exhaustion.
    pub state: GateState,
}

impl UnresolvedGate {
    /// Creates a new unresolved gate annotation.
    #[must_use]
    pub fn new(stage_id: impl Into<String>, attempts: u32, state: GateState) -> Self {
        Self {
            stage_id: stage_id.into(),
            attempts,
            state,
        }
    }
}

impl fmt::Display for UnresolvedGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage '{}' after {} attempt(s): {}",
            self.stage_id, self.attempts, self.state
        )
    }
}

/// The result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalArtifact {
    /// Identifier of the run that produced the artifact.
    pub run_id: Uuid,
    /// The seed input the run started from.
    pub seed: String,
    /// Output of the last stage.
    pub text: String,
    /// Every stage output keyed by output key.
    pub outputs: BTreeMap<String, String>,
    /// Derived constraints locked during the run.
    pub constraints: BTreeMap<String, String>,
    /// Gates that were passed by the best-effort policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_gates: Vec<UnresolvedGate>,
    /// Revision loop attempts keyed by stage id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub revision_history: BTreeMap<String, Vec<RevisionAttempt>>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the artifact was produced.
    pub completed_at: DateTime<Utc>,
}

impl FinalArtifact {
    /// Returns true if any gate was passed without its signal clearing.
    #[must_use]
    pub fn has_unresolved_gates(&self) -> bool {
        !self.unresolved_gates.is_empty()
    }

    /// Returns a stage output by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}
