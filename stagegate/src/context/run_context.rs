//! The per-run accumulator passed explicitly to every stage.

use super::{DerivedConstraints, RunOptions};
use crate::core::{RevisionAttempt, RunStatus, UnresolvedGate};
use crate::errors::OutputConflictError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything a run has produced so far.
///
/// Outputs are append-only: a key is written once, by the stage that owns it.
/// Revision loops keep their attempts aside and write the canonical result
/// once, so the same invariant holds for gated stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// The seed input.
    pub seed: String,
    /// Standing directives and loop bounds.
    pub options: RunOptions,
    /// Stage outputs keyed by output key.
    outputs: BTreeMap<String, String>,
    /// Stage ids in completion order.
    completed_stages: Vec<String>,
    /// Values locked by earlier stages.
    #[serde(default)]
    pub constraints: DerivedConstraints,
    /// Gates passed by the best-effort policy.
    #[serde(default)]
    pub unresolved_gates: Vec<UnresolvedGate>,
    /// Revision loop attempts keyed by stage id.
    #[serde(default)]
    pub revision_history: BTreeMap<String, Vec<RevisionAttempt>>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Creates a fresh context for a seed.
    #[must_use]
    pub fn new(run_id: Uuid, seed: impl Into<String>, options: RunOptions) -> Self {
        Self {
            run_id,
            seed: seed.into(),
            options,
            outputs: BTreeMap::new(),
            completed_stages: Vec::new(),
            constraints: DerivedConstraints::new(),
            unresolved_gates: Vec::new(),
            revision_history: BTreeMap::new(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
        }
    }

    /// Records a stage output.
    ///
    /// # Errors
    ///
    /// Returns [`OutputConflictError`] if the key already holds a value.
    pub fn record_output(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), OutputConflictError> {
        let key = key.into();
        if self.outputs.contains_key(&key) {
            return Err(OutputConflictError::new(key));
        }
        self.outputs.insert(key, value.into());
        Ok(())
    }

    /// Returns a stage output by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    /// Returns true if the key holds a value.
    #[must_use]
    pub fn has_output(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    /// Returns all outputs.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// Marks a stage as completed.
    pub fn mark_stage_completed(&mut self, stage_id: impl Into<String>) {
        self.completed_stages.push(stage_id.into());
    }

    /// Returns completed stage ids in order.
    #[must_use]
    pub fn completed_stages(&self) -> &[String] {
        &self.completed_stages
    }

    /// Returns true if the stage has completed.
    #[must_use]
    pub fn is_stage_completed(&self, stage_id: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage_id)
    }

    /// Returns the id of the last completed stage.
    #[must_use]
    pub fn last_completed_stage(&self) -> Option<&str> {
        self.completed_stages.last().map(String::as_str)
    }

    /// Records a gate that was passed by policy.
    pub fn annotate_unresolved(&mut self, gate: UnresolvedGate) {
        self.unresolved_gates.push(gate);
    }

    /// Stores the attempts of a revision loop.
    pub fn record_revisions(&mut self, stage_id: impl Into<String>, attempts: Vec<RevisionAttempt>) {
        self.revision_history.insert(stage_id.into(), attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GateState;
    use crate::signals::RejectionCategory;

    fn context() -> RunContext {
        RunContext::new(Uuid::new_v4(), "a seed", RunOptions::default())
    }

    #[test]
    fn test_record_output_once() {
        let mut ctx = context();
        ctx.record_output("concept", "first").unwrap();

        let err = ctx.record_output("concept", "second").unwrap_err();
        assert_eq!(err.key, "concept");
        assert_eq!(ctx.output("concept"), Some("first"));
    }

    #[test]
    fn test_stage_completion_order() {
        let mut ctx = context();
        assert!(ctx.last_completed_stage().is_none());

        ctx.mark_stage_completed("concept");
        ctx.mark_stage_completed("audience");

        assert_eq!(ctx.completed_stages(), ["concept", "audience"]);
        assert_eq!(ctx.last_completed_stage(), Some("audience"));
        assert!(ctx.is_stage_completed("concept"));
        assert!(!ctx.is_stage_completed("script"));
    }

    #[test]
    fn test_context_serialization_preserves_state() {
        let mut ctx = context();
        ctx.record_output("concept", "text").unwrap();
        ctx.mark_stage_completed("concept");
        ctx.constraints.set_if_absent("primary_entity", "Lumen");
        ctx.annotate_unresolved(UnresolvedGate::new(
            "concept",
            3,
            GateState::Rejected {
                category: RejectionCategory::Generic,
            },
        ));

        let json = serde_json::to_string(&ctx).unwrap();
        let back: RunContext = serde_json::from_str(&json).unwrap();

        assert_eq!(back.run_id, ctx.run_id);
        assert_eq!(back.output("concept"), Some("text"));
        assert_eq!(back.completed_stages(), ["concept"]);
        assert_eq!(back.constraints.get("primary_entity"), Some("Lumen"));
        assert_eq!(back.unresolved_gates.len(), 1);
    }
}
