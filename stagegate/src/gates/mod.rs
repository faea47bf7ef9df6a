//! Gate decisions and the bounded loops that recover from them.
//!
//! This module provides:
//! - [`GateController`], which turns extracted signals into decisions
//! - [`PivotLoop`], the bounded re-attempt loop behind a rejection gate
//! - [`RevisionLoop`], the bounded draft→critique loop behind a score gate
//!
//! Loops drive a participant trait rather than the gateway directly, so the
//! engine keeps ownership of cancellation checks and prompt composition.

mod controller;
mod pivot;
mod revision;

pub use controller::{GateController, GateResult};
pub use pivot::{PivotLoop, PivotOutcome, PivotParticipant, PivotRequest};
pub use revision::{Feedback, RevisionLoop, RevisionOutcome, RevisionParticipant};

use crate::errors::GatewayError;
use thiserror::Error;

/// Why a participant could not produce text for a loop attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// The gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The run was cancelled at a gateway edge.
    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl InvokeError {
    /// True for gateway failures a loop may absorb by spending an attempt.
    #[must_use]
    pub fn is_absorbable(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_retryable())
    }
}
