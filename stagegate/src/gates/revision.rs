//! Bounded draft→critique loop behind a score gate.

use super::{GateController, InvokeError};
use crate::core::{GateState, RevisionAttempt, UnresolvedGate};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// The previous attempt, handed to the producer when it revises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// 1-based index of the attempt being requested.
    pub attempt: u32,
    /// The previous draft.
    pub draft: String,
    /// The critique of the previous draft.
    pub critique: String,
    /// The score read from that critique.
    pub score: Option<u8>,
    /// The score needed to pass.
    pub threshold: u8,
}

/// Producer and critic of a score-gated stage.
#[async_trait]
pub trait RevisionParticipant: Send {
    /// Produces a draft. `feedback` is `None` for the first attempt.
    async fn draft(&mut self, feedback: Option<&Feedback>) -> Result<String, InvokeError>;

    /// Critiques a draft. The critique should carry a score.
    async fn critique(&mut self, draft: &str) -> Result<String, InvokeError>;
}

/// Result of a revision loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionOutcome {
    /// Every completed attempt, in order. Exactly one is marked best.
    pub attempts: Vec<RevisionAttempt>,
    /// Whether an attempt cleared the gate.
    pub cleared: bool,
    /// The threshold the loop ran against.
    pub threshold: u8,
    best: usize,
}

impl RevisionOutcome {
    /// The canonical attempt.
    #[must_use]
    pub fn best(&self) -> &RevisionAttempt {
        &self.attempts[self.best]
    }

    /// Highest score seen across attempts.
    #[must_use]
    pub fn best_score(&self) -> Option<u8> {
        self.attempts.iter().filter_map(|a| a.score).max()
    }

    /// Number of completed attempts.
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
        Some(UnresolvedGate::new(
            stage_id,
            self.attempt_count(),
            GateState::BelowThreshold {
                best_score: self.best_score(),
                threshold: self.threshold,
            },
        ))
    }
}

/// Drafts, critiques and revises until a score clears the threshold or the
/// budget runs out.
///
/// The canonical result is always the highest-scoring attempt, ties going to
/// the earliest. A scored attempt outranks an unscored one, so a later
/// critique without a score clears the gate without displacing it.
#[derive(Debug, Clone)]
pub struct RevisionLoop<'a> {
    controller: &'a GateController,
    stage_id: &'a str,
    threshold: u8,
    budget: u32,
}

impl<'a> RevisionLoop<'a> {
    /// Creates a loop allowing `budget` total attempts (at least one).
    #[must_use]
    pub fn new(controller: &'a GateController, stage_id: &'a str, threshold: u8, budget: u32) -> Self {
        Self {
            controller,
            stage_id,
            threshold,
            budget: budget.max(1),
        }
    }

    /// Runs the loop.
    ///
    /// A retryable gateway failure on a follow-up attempt spends that attempt;
    /// any failure on the first attempt, and any other failure, propagates.
    pub async fn run<P>(&self, participant: &mut P) -> Result<RevisionOutcome, InvokeError>
    where
        P: RevisionParticipant + ?Sized,
    {
        let mut attempts: Vec<RevisionAttempt> = Vec::new();

        for index in 1..=self.budget {
            let feedback = attempts.last().map(|prev| Feedback {
                attempt: index,
                draft: prev.draft.clone(),
                critique: prev.critique.clone(),
                score: prev.score,
                threshold: self.threshold,
            });
            if feedback.is_some() {
                info!(stage = self.stage_id, attempt = index, "Score gate retry");
            }

            let step = async {
                let draft = participant.draft(feedback.as_ref()).await?;
                let critique = participant.critique(&draft).await?;
                Ok::<_, InvokeError>((draft, critique))
            };
            let (draft, critique) = match step.await {
                Ok(pair) => pair,
                Err(err) if index > 1 && err.is_absorbable() => {
                    warn!(stage = self.stage_id, attempt = index, error = %err, "Revision attempt failed");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let result = self.controller.evaluate_score(&critique, self.threshold);
            debug!(
                stage = self.stage_id,
                attempt = index,
                score = ?result.score,
                threshold = self.threshold,
                "Revision attempt scored"
            );
            attempts.push(RevisionAttempt::new(index, draft, critique, result.score));

            if result.is_proceed() {
                return Ok(self.finish(attempts, true));
            }
        }

        warn!(
            stage = self.stage_id,
            attempts = attempts.len(),
            threshold = self.threshold,
            "Score gate exhausted"
        );
        Ok(self.finish(attempts, false))
    }

    fn finish(&self, mut attempts: Vec<RevisionAttempt>, cleared: bool) -> RevisionOutcome {
        let best = best_index(&attempts);
        attempts[best].is_best = true;
        RevisionOutcome {
            attempts,
            cleared,
            threshold: self.threshold,
            best,
        }
    }
}

/// Index of the highest-scoring attempt; the earliest wins ties and `None`
/// ranks below every score.
fn best_index(attempts: &[RevisionAttempt]) -> usize {
    let mut best = 0;
    for (idx, attempt) in attempts.iter().enumerate().skip(1) {
        if attempt.score > attempts[best].score {
            best = idx;
        }
    }
    best
}
