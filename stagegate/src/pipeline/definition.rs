//! Stage definitions.

use crate::context::ExtractionRule;
use crate::prompt::PromptBuilder;
use std::fmt;
use std::sync::Arc;

/// The critic half of a score-gated stage.
#[derive(Clone)]
pub struct CriticDefinition {
    /// Role description sent to the gateway.
    pub role: String,
    /// Output key for the canonical critique.
    pub output_key: String,
    /// The critic's instructions. The draft is appended by the composer.
    pub prompt: Arc<dyn PromptBuilder>,
}

impl CriticDefinition {
    /// Creates a critic.
    #[must_use]
    pub fn new(
        role: impl Into<String>,
        output_key: impl Into<String>,
        prompt: impl PromptBuilder + 'static,
    ) -> Self {
        Self {
            role: role.into(),
            output_key: output_key.into(),
            prompt: Arc::new(prompt),
        }
    }
}

impl fmt::Debug for CriticDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticDefinition")
            .field("role", &self.role)
            .field("output_key", &self.output_key)
            .finish_non_exhaustive()
    }
}

/// A score gate and its critic.
#[derive(Debug, Clone)]
pub struct ScoreGate {
    /// Threshold for this stage; `None` uses the engine default.
    pub threshold: Option<u8>,
    /// The critic that scores each draft.
    pub critic: CriticDefinition,
}

/// The gate guarding a stage's output.
#[derive(Debug, Clone, Default)]
pub enum GateKind {
    /// Output is accepted as-is.
    #[default]
    None,
    /// Output is checked for rejection markers and pivoted on rejection.
    Rejection,
    /// Output is critiqued and revised until it scores high enough.
    Score(ScoreGate),
}

impl GateKind {
    /// Short label for logs and spans.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rejection => "rejection",
            Self::Score(_) => "score",
        }
    }
}

/// One stage of a run.
#[derive(Clone)]
pub struct StageDefinition {
    /// Unique stage id.
    pub id: String,
    /// Role description sent to the gateway.
    pub role: String,
    /// Key the canonical output is stored under.
    pub output_key: String,
    /// Builds the stage instructions.
    pub prompt: Arc<dyn PromptBuilder>,
    /// The gate guarding the output.
    pub gate: GateKind,
    /// Rules deriving constraints from the canonical output.
    pub extraction: Vec<ExtractionRule>,
    /// Whether to blend knowledge snippets into the prompt.
    pub uses_knowledge: bool,
    /// Capability flags requested for this stage's calls.
    pub capabilities: Vec<String>,
}

impl StageDefinition {
    /// Creates an ungated stage.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        output_key: impl Into<String>,
        prompt: impl PromptBuilder + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            output_key: output_key.into(),
            prompt: Arc::new(prompt),
            gate: GateKind::None,
            extraction: Vec::new(),
            uses_knowledge: false,
            capabilities: Vec::new(),
        }
    }

    /// Guards the stage with a rejection gate.
    #[must_use]
    pub fn with_rejection_gate(mut self) -> Self {
        self.gate = GateKind::Rejection;
        self
    }

    /// Guards the stage with a score gate.
    #[must_use]
    pub fn with_score_gate(mut self, critic: CriticDefinition, threshold: Option<u8>) -> Self {
        self.gate = GateKind::Score(ScoreGate { threshold, critic });
        self
    }

    /// Adds a constraint extraction rule.
    #[must_use]
    pub fn with_extraction(mut self, rule: ExtractionRule) -> Self {
        self.extraction.push(rule);
        self
    }

    /// Blends knowledge snippets into this stage's prompt.
    #[must_use]
    pub fn with_knowledge(mut self) -> Self {
        self.uses_knowledge = true;
        self
    }

    /// Requests a capability for this stage's calls.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Every output key this stage writes.
    #[must_use]
    pub fn produced_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.output_key.as_str()];
        if let GateKind::Score(gate) = &self.gate {
            keys.push(gate.critic.output_key.as_str());
        }
        keys
    }

    /// Every output key this stage reads.
    #[must_use]
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = self.prompt.references();
        if let GateKind::Score(gate) = &self.gate {
            for key in gate.critic.prompt.references() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("output_key", &self.output_key)
            .field("gate", &self.gate)
            .field("extraction", &self.extraction)
            .field("uses_knowledge", &self.uses_knowledge)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::TemplatePrompt;

    #[test]
    fn test_stage_builders() {
        let stage = StageDefinition::new("concept", "Strategist", "concept", TemplatePrompt::new("{seed}"))
            .with_rejection_gate()
            .with_knowledge()
            .with_capability("web_search");

        assert_eq!(stage.gate.label(), "rejection");
        assert!(stage.uses_knowledge);
        assert_eq!(stage.produced_keys(), vec!["concept"]);
    }

    #[test]
    fn test_score_gate_keys() {
        let critic = CriticDefinition::new(
            "Editor",
            "script_critique",
            TemplatePrompt::new("Judge against {output:outline}"),
        );
        let stage = StageDefinition::new(
            "script",
            "Writer",
            "script",
            TemplatePrompt::new("Write.").with_requires(["concept"]),
        )
        .with_score_gate(critic, Some(90));

        assert_eq!(stage.gate.label(), "score");
        assert_eq!(stage.produced_keys(), vec!["script", "script_critique"]);
        assert_eq!(stage.referenced_keys(), vec!["concept", "outline"]);
        assert!(format!("{stage:?}").contains("script_critique"));
    }
}
