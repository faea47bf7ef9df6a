//! Error types for the stagegate engine.
//!
//! Gate outcomes (rejections, low scores) are not errors: they are recovered
//! inside bounded loops. Cancellation is not an error either; it surfaces as
//! [`crate::pipeline::RunOutcome::Cancelled`]. Everything here is a genuine
//! failure of a run or of its configuration.

use crate::core::UnresolvedGate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// The stage registry failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The reasoning gateway failed outside of a bounded loop.
    #[error("Gateway failure in stage '{stage}': {source}")]
    Gateway {
        /// The stage whose invocation failed.
        stage: String,
        /// The underlying gateway failure.
        #[source]
        source: GatewayError,
    },

    /// A checkpoint could not be read, written, or trusted.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// Engine or run configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An output key was written twice outside of a revision loop.
    #[error("{0}")]
    OutputConflict(#[from] OutputConflictError),

    /// A gate stayed unresolved and the run uses the hard-fail policy.
    #[error("Gate exhausted at stage '{stage}': {state}")]
    GateExhausted {
        /// The gated stage.
        stage: String,
        /// The gate state at exhaustion.
        state: UnresolvedGate,
    },
}

impl StagegateError {
    /// Wraps a gateway failure with the stage it occurred in.
    #[must_use]
    pub fn gateway(stage: impl Into<String>, source: GatewayError) -> Self {
        Self::Gateway {
            stage: stage.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in event payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Gateway { .. } => "gateway",
            Self::Checkpoint(_) => "checkpoint",
            Self::Config(_) => "config",
            Self::OutputConflict(_) => "output_conflict",
            Self::GateExhausted { .. } => "gate_exhausted",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        match self {
            Self::Gateway { stage, source } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert("gateway_error".to_string(), serde_json::json!(source.kind()));
                map.insert("retryable".to_string(), serde_json::json!(source.is_retryable()));
            }
            Self::GateExhausted { stage, state } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert(
                    "gate".to_string(),
                    serde_json::to_value(state).unwrap_or_default(),
                );
            }
            Self::Validation(err) => {
                map.insert("stages".to_string(), serde_json::json!(err.stages));
            }
            _ => {}
        }
        map
    }
}

/// Failures reported by a reasoning gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum GatewayError {
    /// A temporary failure (timeout, connection reset, 5xx).
    #[error("transient gateway failure: {0}")]
    Transient(String),

    /// The provider throttled the request.
    #[error("gateway rate limited: {0}")]
    RateLimited(String),

    /// The request itself was rejected; retrying will not help.
    #[error("invalid gateway request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a rate-limit failure.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited(message.into())
    }

    /// Creates an invalid-request failure.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns true if a bounded loop may spend another attempt after this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }

    /// Short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Errors raised by checkpoint stores and resume validation.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The backing store failed at the I/O layer.
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint could not be encoded or decoded.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The slot holds data that is not a usable checkpoint.
    #[error("Corrupt checkpoint in slot '{slot}': {reason}")]
    Corrupt {
        /// The slot key.
        slot: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No checkpoint exists in the slot.
    #[error("No checkpoint in slot '{slot}'")]
    NotFound {
        /// The slot key.
        slot: String,
    },

    /// The checkpoint was taken for a different seed input.
    #[error("Checkpoint seed mismatch: checkpoint has {expected}, resume supplied {found}")]
    SeedMismatch {
        /// Fingerprint stored in the checkpoint.
        expected: String,
        /// Fingerprint of the seed supplied at resume time.
        found: String,
    },

    /// The checkpoint does not describe a prefix of the current registry.
    #[error("Checkpoint does not match the stage registry: {0}")]
    RegistryMismatch(String),
}

impl CheckpointError {
    /// Creates a corrupt-checkpoint error.
    #[must_use]
    pub fn corrupt(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            slot: slot.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by run history sinks.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The backing file could not be written.
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded.
    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid-configuration error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "REGISTRY-002-DUPLICATE_OUTPUT").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a stage registry fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when writing an output key that already holds a value.
#[derive(Debug, Clone, Error)]
#[error("Output conflict: key '{key}' was already written by an earlier stage")]
pub struct OutputConflictError {
    /// The conflicting output key.
    pub key: String,
}

impl OutputConflictError {
    /// Creates a new output conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GateState;
    use crate::signals::RejectionCategory;

    #[test]
    fn test_gateway_error_retryable() {
        assert!(GatewayError::transient("timeout").is_retryable());
        assert!(GatewayError::rate_limited("429").is_retryable());
        assert!(!GatewayError::invalid_request("bad prompt").is_retryable());
    }

    #[test]
    fn test_gateway_error_serialization() {
        let err = GatewayError::rate_limited("slow down");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["message"], "slow down");
    }

    #[test]
    fn test_stagegate_error_to_dict() {
        let err = StagegateError::gateway("script", GatewayError::transient("timeout"));
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "gateway");
        assert_eq!(dict.get("stage").unwrap(), "script");
        assert_eq!(dict.get("retryable").unwrap(), true);
    }

    #[test]
    fn test_gate_exhausted_display() {
        let err = StagegateError::GateExhausted {
            stage: "concept".to_string(),
            state: UnresolvedGate::new(
                "concept",
                3,
                GateState::Rejected {
                    category: RejectionCategory::Validity,
                },
            ),
        };
        let message = err.to_string();
        assert!(message.contains("concept"));
        assert!(message.contains("validity"));
    }

    #[test]
    fn test_every_error_kind_is_distinct() {
        let errors = [
            StagegateError::from(PipelineValidationError::new("empty")),
            StagegateError::gateway("script", GatewayError::transient("timeout")),
            StagegateError::from(CheckpointError::corrupt("slot", "truncated")),
            StagegateError::from(ConfigError::invalid("bad budget")),
            StagegateError::from(OutputConflictError::new("script")),
            StagegateError::GateExhausted {
                stage: "concept".to_string(),
                state: UnresolvedGate::new(
                    "concept",
                    3,
                    GateState::Rejected {
                        category: RejectionCategory::Validity,
                    },
                ),
            },
        ];
        let kinds: Vec<&str> = errors.iter().map(StagegateError::kind).collect();
        assert_eq!(
            kinds,
            vec!["validation", "gateway", "checkpoint", "config", "output_conflict", "gate_exhausted"]
        );
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("duplicate")
            .with_stages(vec!["a".to_string()])
            .with_error_info(ContractErrorInfo::new("REGISTRY-001", "dup").with_fix_hint("rename"));
        assert_eq!(err.code(), Some("REGISTRY-001"));
        assert_eq!(err.stages, vec!["a".to_string()]);
    }
}
