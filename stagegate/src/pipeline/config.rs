//! Engine configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default checkpoint slot key.
pub const DEFAULT_CHECKPOINT_SLOT: &str = "stagegate/active-run";

/// Default score gate threshold.
pub const DEFAULT_SCORE_THRESHOLD: u8 = 85;

/// Default number of knowledge snippets per stage.
pub const DEFAULT_KNOWLEDGE_TOP_K: usize = 3;

/// Settings shared by every run of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slot key the checkpoint manager writes to.
    pub checkpoint_slot: String,
    /// Threshold for score gates that do not set their own.
    pub score_threshold: u8,
    /// Knowledge snippets requested per stage.
    pub knowledge_top_k: usize,
    /// Capability flags sent with every gateway call.
    pub capabilities: Vec<String>,
    /// Reject resumes whose seed does not match the checkpoint.
    pub strict_resume: bool,
    /// Characters quoted from each prior output; 0 quotes everything.
    pub max_prior_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_slot: DEFAULT_CHECKPOINT_SLOT.to_string(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            knowledge_top_k: DEFAULT_KNOWLEDGE_TOP_K,
            capabilities: Vec::new(),
            strict_resume: false,
            max_prior_chars: 0,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies `STAGEGATE_SLOT`, `STAGEGATE_SCORE_THRESHOLD` and
    /// `STAGEGATE_TOP_K` from the process environment.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(slot) = lookup("STAGEGATE_SLOT") {
            self.checkpoint_slot = slot;
        }
        if let Some(raw) = lookup("STAGEGATE_SCORE_THRESHOLD") {
            self.score_threshold = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(format!("STAGEGATE_SCORE_THRESHOLD is not a score: '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("STAGEGATE_TOP_K") {
            self.knowledge_top_k = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(format!("STAGEGATE_TOP_K is not a count: '{raw}'"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the checkpoint slot.
    #[must_use]
    pub fn with_checkpoint_slot(mut self, slot: impl Into<String>) -> Self {
        self.checkpoint_slot = slot.into();
        self
    }

    /// Sets the default score threshold.
    #[must_use]
    pub fn with_score_threshold(mut self, threshold: u8) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Sets the knowledge snippet count.
    #[must_use]
    pub fn with_knowledge_top_k(mut self, top_k: usize) -> Self {
        self.knowledge_top_k = top_k;
        self
    }

    /// Adds a capability flag for every call.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Rejects resumes with a mismatched seed.
    #[must_use]
    pub fn with_strict_resume(mut self, strict: bool) -> Self {
        self.strict_resume = strict;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_slot.trim().is_empty() {
            return Err(ConfigError::invalid("checkpoint_slot must not be blank"));
        }
        if self.score_threshold > 100 {
            return Err(ConfigError::invalid(format!(
                "score_threshold must be <= 100, got {}",
                self.score_threshold
            )));
        }
        if self.knowledge_top_k == 0 || self.knowledge_top_k > 50 {
            return Err(ConfigError::invalid(format!(
                "knowledge_top_k must be in 1..=50, got {}",
                self.knowledge_top_k
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.checkpoint_slot, "stagegate/active-run");
        assert_eq!(config.score_threshold, 85);
        assert_eq!(config.knowledge_top_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json_str(r#"{"score_threshold": 90, "strict_resume": true}"#).unwrap();
        assert_eq!(config.score_threshold, 90);
        assert!(config.strict_resume);
        assert_eq!(config.knowledge_top_k, DEFAULT_KNOWLEDGE_TOP_K);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"score_threshold": 101}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"checkpoint_slot": "campaign-7"}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.checkpoint_slot, "campaign-7");
        assert!(matches!(
            EngineConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STAGEGATE_SLOT", "run-b"),
            ("STAGEGATE_SCORE_THRESHOLD", " 70 "),
            ("STAGEGATE_TOP_K", "5"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides(|name| vars.get(name).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.checkpoint_slot, "run-b");
        assert_eq!(config.score_threshold, 70);
        assert_eq!(config.knowledge_top_k, 5);
    }

    #[test]
    fn test_bad_override() {
        let result = EngineConfig::default().with_overrides(|name| {
            (name == "STAGEGATE_SCORE_THRESHOLD").then(|| "high".to_string())
        });
        assert!(result.is_err());
    }
}
