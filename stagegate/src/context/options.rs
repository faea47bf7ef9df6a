//! Per-run options and standing directives.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Default bound for pivot and revision loops.
pub const DEFAULT_MAX_REVISIONS: u32 = 3;

/// Upper bound accepted for `max_revisions`.
pub const MAX_REVISIONS_LIMIT: u32 = 10;

/// What to do when a bounded loop runs out of attempts without clearing its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Proceed with the canonical attempt and annotate the artifact.
    #[default]
    BestEffort,
    /// Stop the run with [`crate::errors::StagegateError::GateExhausted`].
    HardFail,
}

/// Options supplied with a seed input.
///
/// Audience, delivery horizon, creative lock and the one-off directive are
/// standing directives: the prompt composer repeats them to every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Who the work is for.
    pub audience: Option<String>,
    /// When or over what span the work is delivered.
    pub delivery_horizon: Option<String>,
    /// A framing every stage must stay within.
    pub creative_lock: Option<String>,
    /// Attempt bound for pivot and revision loops.
    pub max_revisions: u32,
    /// A one-off directive, typically supplied on an externally triggered rerun.
    pub directive: Option<String>,
    /// Terminal policy for exhausted loops.
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            audience: None,
            delivery_horizon: None,
            creative_lock: None,
            max_revisions: DEFAULT_MAX_REVISIONS,
            directive: None,
            on_exhausted: ExhaustionPolicy::BestEffort,
        }
    }
}

impl RunOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the audience label.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the delivery horizon.
    #[must_use]
    pub fn with_delivery_horizon(mut self, horizon: impl Into<String>) -> Self {
        self.delivery_horizon = Some(horizon.into());
        self
    }

    /// Sets the creative lock.
    #[must_use]
    pub fn with_creative_lock(mut self, lock: impl Into<String>) -> Self {
        self.creative_lock = Some(lock.into());
        self
    }

    /// Sets the loop bound.
    #[must_use]
    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Sets the one-off directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Sets the terminal policy for exhausted loops.
    #[must_use]
    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// Total attempts a bounded loop may make.
    ///
    /// `max_revisions = 0` still allows the single initial attempt.
    #[must_use]
    pub fn attempt_budget(&self) -> u32 {
        self.max_revisions.max(1)
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_revisions > MAX_REVISIONS_LIMIT {
            return Err(ConfigError::invalid(format!(
                "max_revisions must be <= {MAX_REVISIONS_LIMIT}, got {}",
                self.max_revisions
            )));
        }

        let labelled = [
            ("audience", &self.audience),
            ("delivery_horizon", &self.delivery_horizon),
            ("creative_lock", &self.creative_lock),
            ("directive", &self.directive),
        ];
        for (name, value) in labelled {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::invalid(format!("{name} must not be blank")));
            }
        }
        Ok(())
    }
}
