//! Gateway traits and the values that cross them.

use crate::errors::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call options passed to a reasoning gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOptions {
    /// Capability flags requested for this call (e.g. `"web_search"`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl InvocationOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability flag.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// Returns true if the capability was requested.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// A reasoning provider.
///
/// `role` describes who is speaking; `task` is the composed prompt. The
/// gateway returns free text; all structure is read back out by the signal
/// extractor.
#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    /// Invokes the provider once.
    async fn invoke(
        &self,
        role: &str,
        task: &str,
        options: &InvocationOptions,
    ) -> Result<String, GatewayError>;
}

/// A reference snippet returned by a knowledge retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    /// The snippet text.
    pub text: String,
    /// Relevance in 0.0..=1.0, higher is better.
    pub relevance_score: f64,
    /// Where the snippet came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl KnowledgeSnippet {
    /// Creates a new snippet.
    #[must_use]
    pub fn new(text: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            text: text.into(),
            relevance_score,
            source_id: None,
        }
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// An optional source of reference material for stage prompts.
///
/// Failures never fail a run: the engine omits knowledge for that stage.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Returns at most `top_k` snippets relevant to `query`.
    async fn search(&self, query: &str, top_k: usize)
        -> Result<Vec<KnowledgeSnippet>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_deduplicated() {
        let options = InvocationOptions::new()
            .with_capability("web_search")
            .with_capability("web_search");
        assert_eq!(options.capabilities, vec!["web_search".to_string()]);
        assert!(options.has_capability("web_search"));
        assert!(!options.has_capability("code"));
    }

    #[test]
    fn test_snippet_serialization() {
        let snippet = KnowledgeSnippet::new("Lamps sell in autumn", 0.8).with_source("kb-12");
        let json = serde_json::to_value(&snippet).unwrap();
        assert_eq!(json["source_id"], "kb-12");

        let bare = serde_json::to_value(KnowledgeSnippet::new("x", 0.1)).unwrap();
        assert!(bare.get("source_id").is_none());
    }
}
