//! Gate decisions over extracted signals.

use crate::context::ExhaustionPolicy;
use crate::core::GateDecision;
use crate::signals::{RejectionCategory, ScoreReading, SignalExtractor};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The decision for one gated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// What to do next.
    pub decision: GateDecision,
    /// Rejection found, for rejection gates.
    pub rejection: Option<RejectionCategory>,
    /// Score found, for score gates.
    pub score: Option<u8>,
    /// A score label was present but its value could not be read.
    #[serde(default)]
    pub ambiguous: bool,
}

impl GateResult {
    fn proceed() -> Self {
        Self {
            decision: GateDecision::Proceed,
            rejection: None,
            score: None,
            ambiguous: false,
        }
    }

    /// Returns true if the gate cleared.
    #[must_use]
    pub fn is_proceed(&self) -> bool {
        self.decision == GateDecision::Proceed
    }
}

/// Turns stage output into gate decisions.
///
/// Each gate reads only its own signal kind: a rejection gate ignores scores
/// and a score gate ignores rejection markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateController {
    extractor: SignalExtractor,
}

impl GateController {
    /// Creates a controller using the given extractor.
    #[must_use]
    pub fn new(extractor: SignalExtractor) -> Self {
        Self { extractor }
    }

    /// Evaluates a rejection gate.
    #[must_use]
    pub fn evaluate_rejection(&self, text: &str) -> GateResult {
        match self.extractor.rejection(text) {
            Some(category) => GateResult {
                decision: GateDecision::Retry,
                rejection: Some(category),
                score: None,
                ambiguous: false,
            },
            None => GateResult::proceed(),
        }
    }

    /// Evaluates a score gate. Unreadable scores proceed.
    #[must_use]
    pub fn evaluate_score(&self, text: &str, threshold: u8) -> GateResult {
        match self.extractor.score(text) {
            ScoreReading::Found(score) => GateResult {
                decision: if score >= threshold {
                    GateDecision::Proceed
                } else {
                    GateDecision::Retry
                },
                rejection: None,
                score: Some(score),
                ambiguous: false,
            },
            ScoreReading::Ambiguous => {
                warn!(threshold, "Score label present but unreadable, proceeding");
                GateResult {
                    ambiguous: true,
                    ..GateResult::proceed()
                }
            }
            ScoreReading::Absent => GateResult::proceed(),
        }
    }

    /// The decision once a loop has spent its budget without clearing.
    #[must_use]
    pub fn resolve_exhausted(policy: ExhaustionPolicy) -> GateDecision {
        match policy {
            ExhaustionPolicy::BestEffort => GateDecision::Proceed,
            ExhaustionPolicy::HardFail => GateDecision::Halt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_gate() {
        let controller = GateController::default();

        let result = controller.evaluate_rejection("[POLICY_VIOLATION] cannot write this");
        assert_eq!(result.decision, GateDecision::Retry);
        assert_eq!(result.rejection, Some(RejectionCategory::Policy));

        let result = controller.evaluate_rejection("A cosy autumn campaign. Score: 10/100");
        assert!(result.is_proceed());
        assert_eq!(result.score, None);
    }

    #[test]
    fn test_score_gate_threshold() {
        let controller = GateController::default();

        let low = controller.evaluate_score("Score: 62/100", 85);
        assert_eq!(low.decision, GateDecision::Retry);
        assert_eq!(low.score, Some(62));

        let exact = controller.evaluate_score("Score: 85/100", 85);
        assert!(exact.is_proceed());

        let high = controller.evaluate_score("Overall Score: 88/100", 85);
        assert!(high.is_proceed());
        assert_eq!(high.score, Some(88));
    }

    #[test]
    fn test_score_gate_ignores_rejection_markers() {
        let controller = GateController::default();
        let result = controller.evaluate_score("[HALT] Score: 90/100", 85);
        assert!(result.is_proceed());
        assert_eq!(result.rejection, None);
    }

    #[test]
    fn test_unreadable_score_proceeds() {
        let controller = GateController::default();

        let ambiguous = controller.evaluate_score("Score: pending", 85);
        assert!(ambiguous.is_proceed());
        assert!(ambiguous.ambiguous);

        let absent = controller.evaluate_score("Nice work.", 85);
        assert!(absent.is_proceed());
        assert!(!absent.ambiguous);
    }

    #[test]
    fn test_resolve_exhausted() {
        assert_eq!(
            GateController::resolve_exhausted(ExhaustionPolicy::BestEffort),
            GateDecision::Proceed
        );
        assert_eq!(
            GateController::resolve_exhausted(ExhaustionPolicy::HardFail),
            GateDecision::Halt
        );
    }
}
