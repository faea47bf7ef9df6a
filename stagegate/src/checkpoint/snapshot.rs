//! The checkpoint payload.

use crate::context::{RunContext, RunOptions};
use crate::errors::CheckpointError;
use crate::utils::fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A snapshot of a run after its last completed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version.
    pub version: u32,
    /// The run context as of the last completed stage.
    pub context: RunContext,
    /// The stage to resume after.
    pub last_completed_stage: String,
    /// Standing directives in force for the run.
    pub directives: RunOptions,
    /// Fingerprint of the seed input.
    pub seed_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When this snapshot was taken.
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Captures a context. Returns `None` before any stage has completed.
    #[must_use]
    pub fn capture(ctx: &RunContext) -> Option<Self> {
        let last = ctx.last_completed_stage()?;
        Some(Self {
            version: CHECKPOINT_VERSION,
            context: ctx.clone(),
            last_completed_stage: last.to_string(),
            directives: ctx.options.clone(),
            seed_fingerprint: fingerprint(&ctx.seed),
            started_at: ctx.started_at,
            saved_at: Utc::now(),
        })
    }

    /// Returns true if the checkpoint was taken for this seed.
    #[must_use]
    pub fn matches_seed(&self, seed: &str) -> bool {
        self.seed_fingerprint == fingerprint(seed)
    }

    /// Checks that the checkpoint belongs to `seed`.
    ///
    /// A mismatch is logged; with `strict` it is also an error.
    pub fn verify_seed(&self, seed: &str, strict: bool) -> Result<(), CheckpointError> {
        if self.matches_seed(seed) {
            return Ok(());
        }
        let found = fingerprint(seed);
        warn!(
            expected = %self.seed_fingerprint,
            found = %found,
            stage = %self.last_completed_stage,
            "Checkpoint was taken for a different seed"
        );
        if strict {
            return Err(CheckpointError::SeedMismatch {
                expected: self.seed_fingerprint.clone(),
                found,
            });
        }
        Ok(())
    }

    /// Encodes the checkpoint as JSON.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and checks a checkpoint read from `slot`.
    pub fn from_json(slot: &str, raw: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(raw)
            .map_err(|e| CheckpointError::corrupt(slot, e.to_string()))?;
        checkpoint.check(slot)?;
        Ok(checkpoint)
    }

    fn check(&self, slot: &str) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::corrupt(
                slot,
                format!("unsupported version {}", self.version),
            ));
        }
        if self.context.last_completed_stage() != Some(self.last_completed_stage.as_str()) {
            return Err(CheckpointError::corrupt(
                slot,
                format!(
                    "last completed stage '{}' disagrees with context",
                    self.last_completed_stage
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context_after(stages: &[&str]) -> RunContext {
        let mut ctx = RunContext::new(Uuid::new_v4(), "Autumn lamp launch", RunOptions::default());
        for stage in stages {
            ctx.record_output(*stage, format!("{stage} output")).unwrap();
            ctx.mark_stage_completed(*stage);
        }
        ctx
    }

    #[test]
    fn test_capture_requires_completed_stage() {
        assert!(Checkpoint::capture(&context_after(&[])).is_none());

        let checkpoint = Checkpoint::capture(&context_after(&["concept", "audience"])).unwrap();
        assert_eq!(checkpoint.last_completed_stage, "audience");
        assert_eq!(checkpoint.version, CHECKPOINT_VERSION);
        assert!(checkpoint.matches_seed(" Autumn lamp launch "));
        assert!(!checkpoint.matches_seed("Winter candles"));
    }

    #[test]
    fn test_verify_seed() {
        let checkpoint = Checkpoint::capture(&context_after(&["concept"])).unwrap();

        assert!(checkpoint.verify_seed("Autumn lamp launch", true).is_ok());
        assert!(checkpoint.verify_seed("Winter candles", false).is_ok());
        assert!(matches!(
            checkpoint.verify_seed("Winter candles", true),
            Err(CheckpointError::SeedMismatch { .. })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let checkpoint = Checkpoint::capture(&context_after(&["concept"])).unwrap();
        let raw = checkpoint.to_json().unwrap();
        let back = Checkpoint::from_json("slot", &raw).unwrap();
        assert_eq!(back.context.output("concept"), Some("concept output"));
        assert_eq!(back.started_at, checkpoint.started_at);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut checkpoint = Checkpoint::capture(&context_after(&["concept"])).unwrap();
        checkpoint.version = 99;
        let raw = serde_json::to_string(&checkpoint).unwrap();
        let err = Checkpoint::from_json("slot", &raw).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_garbage_and_inconsistency() {
        assert!(matches!(
            Checkpoint::from_json("slot", "{not json"),
            Err(CheckpointError::Corrupt { .. })
        ));

        let mut checkpoint = Checkpoint::capture(&context_after(&["concept"])).unwrap();
        checkpoint.last_completed_stage = "script".to_string();
        let raw = serde_json::to_string(&checkpoint).unwrap();
        assert!(Checkpoint::from_json("slot", &raw).is_err());
    }
}
