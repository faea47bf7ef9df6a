//! Attempts recorded by bounded gate loops.

use crate::signals::RejectionCategory;
use serde::{Deserialize, Serialize};

/// One draft→critique iteration of a revision loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionAttempt {
    /// 1-based attempt index.
    pub index: u32,
    /// The producer's draft.
    pub draft: String,
    /// The critic's response to the draft.
    pub critique: String,
    /// Score read from the critique, if one could be extracted.
    pub score: Option<u8>,
    /// Whether this attempt became the canonical result.
    #[serde(default)]
    pub is_best: bool,
}

impl RevisionAttempt {
    /// Creates a new attempt that is not (yet) marked best.
    #[must_use]
    pub fn new(
        index: u32,
        draft: impl Into<String>,
        critique: impl Into<String>,
        score: Option<u8>,
    ) -> Self {
        Self {
            index,
            draft: draft.into(),
            critique: critique.into(),
            score,
            is_best: false,
        }
    }
}

/// One attempt of a rejection-gated stage inside a pivot loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotAttempt {
    /// 1-based attempt index.
    pub index: u32,
    /// The stage output for this attempt.
    pub text: String,
    /// Rejection found in the output, if any.
    pub rejection: Option<RejectionCategory>,
}

impl PivotAttempt {
    /// Returns true if this attempt cleared the rejection gate.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}
