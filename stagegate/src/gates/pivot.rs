//! Bounded pivot loop behind a rejection gate.

use super::{GateController, InvokeError};
use crate::core::{GateState, PivotAttempt, UnresolvedGate};
use crate::signals::RejectionCategory;
use async_trait::async_trait;
use tracing::{info, warn};

/// Context handed to a participant for a follow-up attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRequest {
    /// 1-based index of the attempt being requested.
    pub attempt: u32,
    /// Category of the rejection being pivoted away from.
    pub category: RejectionCategory,
    /// The most recent rejected output.
    pub rejected: String,
}

/// Produces the output of a rejection-gated stage.
#[async_trait]
pub trait PivotParticipant: Send {
    /// Produces one attempt. `pivot` is `None` for the first attempt.
    async fn attempt(&mut self, pivot: Option<&PivotRequest>) -> Result<String, InvokeError>;
}

/// Result of a pivot loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotOutcome {
    /// The canonical text: the accepted attempt, or the last one on exhaustion.
    pub text: String,
    /// Every attempt that produced text, in order.
    pub attempts: Vec<PivotAttempt>,
    /// Whether an attempt cleared the gate.
    pub cleared: bool,
}

impl PivotOutcome {
    /// Number of attempts that produced text.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// The gate annotation when the loop did not clear.
    #[must_use]
    pub fn unresolved(&self, stage_id: &str) -> Option<UnresolvedGate> {
        if self.cleared {
            return None;
        }
        let category = self.attempts.last().and_then(|a| a.rejection)?;
        Some(UnresolvedGate::new(
            stage_id,
            self.attempt_count(),
            GateState::Rejected { category },
        ))
    }
}

/// Re-invokes a rejected stage with a pivot directive, up to a fixed budget.
#[derive(Debug, Clone)]
pub struct PivotLoop<'a> {
    controller: &'a GateController,
    stage_id: &'a str,
    budget: u32,
}

impl<'a> PivotLoop<'a> {
    /// Creates a loop allowing `budget` total attempts (at least one).
    #[must_use]
    pub fn new(controller: &'a GateController, stage_id: &'a str, budget: u32) -> Self {
        Self {
            controller,
            stage_id,
            budget: budget.max(1),
        }
    }

    /// Runs the loop.
    ///
    /// A retryable gateway failure on a follow-up attempt spends that attempt;
    /// any failure on the first attempt, and any other failure, propagates.
    pub async fn run<P>(&self, participant: &mut P) -> Result<PivotOutcome, InvokeError>
    where
        P: PivotParticipant + ?Sized,
    {
        let first = participant.attempt(None).await?;
        let mut attempts = Vec::new();
        let Some(mut request) = self.record(1, first.clone(), &mut attempts) else {
            return Ok(PivotOutcome {
                text: first,
                attempts,
                cleared: true,
            });
        };

        for index in 2..=self.budget {
            info!(
                stage = self.stage_id,
                attempt = index,
                category = %request.category,
                "Rejection gate retry"
            );
            request.attempt = index;

            let text = match participant.attempt(Some(&request)).await {
                Ok(text) => text,
                Err(err) if err.is_absorbable() => {
                    warn!(stage = self.stage_id, attempt = index, error = %err, "Pivot attempt failed");
                    continue;
                }
                Err(err) => return Err(err),
            };

            match self.record(index, text.clone(), &mut attempts) {
                Some(next) => request = next,
                None => {
                    return Ok(PivotOutcome {
                        text,
                        attempts,
                        cleared: true,
                    })
                }
            }
        }

        warn!(
            stage = self.stage_id,
            attempts = attempts.len(),
            category = %request.category,
            "Rejection gate exhausted"
        );
        Ok(PivotOutcome {
            text: request.rejected,
            attempts,
            cleared: false,
        })
    }

    /// Records an attempt and returns the next pivot request if it was rejected.
    fn record(
        &self,
        index: u32,
        text: String,
        attempts: &mut Vec<PivotAttempt>,
    ) -> Option<PivotRequest> {
        let result = self.controller.evaluate_rejection(&text);
        attempts.push(PivotAttempt {
            index,
            text: text.clone(),
            rejection: result.rejection,
        });
        result.rejection.map(|category| PivotRequest {
            attempt: index + 1,
            category,
            rejected: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use std::collections::VecDeque;

    struct Scripted {
        responses: VecDeque<Result<String, InvokeError>>,
        requests: Vec<Option<PivotRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<&str, InvokeError>>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PivotParticipant for Scripted {
        async fn attempt(&mut self, pivot: Option<&PivotRequest>) -> Result<String, InvokeError> {
            self.requests.push(pivot.cloned());
            self.responses
                .pop_front()
                .unwrap_or_else(|| Ok("unscripted".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_attempt_accepted() {
        let controller = GateController::default();
        let mut participant = Scripted::new(vec![Ok("A warm concept")]);

        let outcome = PivotLoop::new(&controller, "concept", 3)
            .run(&mut participant)
            .await
            .unwrap();

        assert!(outcome.cleared);
        assert_eq!(outcome.text, "A warm concept");
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(participant.requests, vec![None]);
        assert!(outcome.unresolved("concept").is_none());
    }

    #[tokio::test]
    async fn test_pivot_then_accept() {
        let controller = GateController::default();
        let mut participant =
            Scripted::new(vec![Ok("[INVALID_PREMISE] no such product"), Ok("A close alternative")]);

        let outcome = PivotLoop::new(&controller, "concept", 3)
            .run(&mut participant)
            .await
            .unwrap();

        assert!(outcome.cleared);
        assert_eq!(outcome.text, "A close alternative");
        let request = participant.requests[1].clone().unwrap();
        assert_eq!(request.attempt, 2);
        assert_eq!(request.category, RejectionCategory::Validity);
        assert_eq!(request.rejected, "[INVALID_PREMISE] no such product");
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_attempt() {
        let controller = GateController::default();
        let mut participant = Scripted::new(vec![
            Ok("[HALT] one"),
            Ok("[HALT] two"),
            Ok("[POLICY_VIOLATION] three"),
            Ok("never requested"),
        ]);

        let outcome = PivotLoop::new(&controller, "concept", 3)
            .run(&mut participant)
            .await
            .unwrap();

        assert!(!outcome.cleared);
        assert_eq!(outcome.text, "[POLICY_VIOLATION] three");
        assert_eq!(participant.requests.len(), 3);

        let gate = outcome.unresolved("concept").unwrap();
        assert_eq!(gate.attempts, 3);
        assert_eq!(
            gate.state,
            GateState::Rejected {
                category: RejectionCategory::Policy
            }
        );
    }

    #[tokio::test]
    async fn test_budget_of_one_never_pivots() {
        let controller = GateController::default();
        let mut participant = Scripted::new(vec![Ok("[HALT]")]);

        let outcome = PivotLoop::new(&controller, "concept", 0)
            .run(&mut participant)
            .await
            .unwrap();

        assert!(!outcome.cleared);
        assert_eq!(participant.requests.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_spends_attempt() {
        let controller = GateController::default();
        let mut participant = Scripted::new(vec![
            Ok("[HALT] one"),
            Err(InvokeError::Gateway(GatewayError::transient("timeout"))),
            Ok("accepted"),
        ]);

        let outcome = PivotLoop::new(&controller, "concept", 3)
            .run(&mut participant)
            .await
            .unwrap();

        assert!(outcome.cleared);
        assert_eq!(outcome.text, "accepted");
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[1].index, 3);
    }

    #[tokio::test]
    async fn test_first_failure_and_invalid_request_propagate() {
        let controller = GateController::default();
        let mut first = Scripted::new(vec![Err(InvokeError::Gateway(GatewayError::transient("x")))]);
        assert!(PivotLoop::new(&controller, "concept", 3).run(&mut first).await.is_err());

        let mut invalid = Scripted::new(vec![
            Ok("[HALT]"),
            Err(InvokeError::Gateway(GatewayError::invalid_request("bad"))),
        ]);
        let err = PivotLoop::new(&controller, "concept", 3)
            .run(&mut invalid)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Gateway(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let controller = GateController::default();
        let mut participant = Scripted::new(vec![
            Ok("[HALT]"),
            Err(InvokeError::Cancelled("stop".to_string())),
        ]);
        let err = PivotLoop::new(&controller, "concept", 3)
            .run(&mut participant)
            .await
            .unwrap_err();
        assert_eq!(err, InvokeError::Cancelled("stop".to_string()));
    }
}
