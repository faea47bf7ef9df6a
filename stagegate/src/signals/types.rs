//! Signal types produced by the extractor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a rejection marker, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    /// The premise itself is not valid in the domain.
    Validity,
    /// The request conflicts with content policy.
    Policy,
    /// The role refused without a more specific reason.
    Generic,
}

impl RejectionCategory {
    /// All categories, highest priority first.
    pub const PRIORITY: [Self; 3] = [Self::Validity, Self::Policy, Self::Generic];

    /// Lower-case markers that identify this category.
    #[must_use]
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Validity => &[
                "[invalid_premise]",
                "invalid premise",
                "premise rejected",
                "not a valid concept",
            ],
            Self::Policy => &[
                "[policy_violation]",
                "policy violation",
                "violates content policy",
                "cannot comply with policy",
            ],
            Self::Generic => &["[halt]", "[rejected]", "cannot proceed", "unable to proceed"],
        }
    }
}

impl fmt::Display for RejectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validity => write!(f, "validity"),
            Self::Policy => write!(f, "policy"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A structured fact read out of stage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "signal", content = "value", rename_all = "snake_case")]
pub enum Signal {
    /// A rejection marker was found.
    Rejection(RejectionCategory),
    /// A score in 0..=100 was found.
    Score(u8),
    /// Nothing recognisable.
    #[default]
    None,
}

impl Signal {
    /// Returns the rejection category, if this is a rejection.
    #[must_use]
    pub fn rejection(&self) -> Option<RejectionCategory> {
        match self {
            Self::Rejection(category) => Some(*category),
            _ => None,
        }
    }

    /// Returns the score, if this is a score.
    #[must_use]
    pub fn score(&self) -> Option<u8> {
        match self {
            Self::Score(score) => Some(*score),
            _ => None,
        }
    }

    /// Returns true if no signal was found.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Result of reading a score from critique text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReading {
    /// A score was matched.
    Found(u8),
    /// A score label is present but no value could be parsed.
    Ambiguous,
    /// No score label or fraction at all.
    Absent,
}

impl ScoreReading {
    /// Returns the score, if one was found.
    #[must_use]
    pub fn value(&self) -> Option<u8> {
        match self {
            Self::Found(score) => Some(*score),
            _ => None,
        }
    }
}
