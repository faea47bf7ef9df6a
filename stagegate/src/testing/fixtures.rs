//! Registry fixtures.

use crate::pipeline::{CriticDefinition, StageDefinition, StageRegistry};
use crate::prompt::TemplatePrompt;

/// `n` ungated stages `s1..sn`, each with role `role:sN` and reading its predecessor.
#[must_use]
pub fn linear_registry(n: usize) -> StageRegistry {
    (1..=n).fold(StageRegistry::new(), |registry, i| {
        let id = format!("s{i}");
        let prompt = if i == 1 {
            TemplatePrompt::new(format!("Stage {i}: work from the brief."))
        } else {
            TemplatePrompt::new(format!("Stage {i}: build on the previous stage."))
                .with_requires([format!("s{}", i - 1)])
        };
        registry.with_stage(StageDefinition::new(&id, format!("role:{id}"), &id, prompt))
    })
}

/// A rejection-gated `concept` stage (role `role:concept`) followed by `tail` ungated stages.
#[must_use]
pub fn rejection_gated_registry(tail: usize) -> StageRegistry {
    let mut registry = StageRegistry::new().with_stage(
        StageDefinition::new(
            "concept",
            "role:concept",
            "concept",
            TemplatePrompt::new("Propose a concept."),
        )
        .with_rejection_gate(),
    );
    for i in 1..=tail {
        let id = format!("after{i}");
        registry.push(StageDefinition::new(
            &id,
            format!("role:{id}"),
            &id,
            TemplatePrompt::new("Continue.").with_requires(["concept"]),
        ));
    }
    registry
}

/// A `script` stage (role `role:writer`) score-gated by `role:critic`, then a `wrap` stage.
#[must_use]
pub fn score_gated_registry(threshold: Option<u8>) -> StageRegistry {
    StageRegistry::new()
        .with_stage(
            StageDefinition::new("script", "role:writer", "script", TemplatePrompt::new("Write."))
                .with_score_gate(
                    CriticDefinition::new("role:critic", "script_critique", TemplatePrompt::new("Judge.")),
                    threshold,
                ),
        )
        .with_stage(StageDefinition::new(
            "wrap",
            "role:wrap",
            "wrap",
            TemplatePrompt::new("Wrap up.").with_requires(["script", "script_critique"]),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_validate() {
        assert!(linear_registry(6).validate().is_ok());
        assert_eq!(linear_registry(6).len(), 6);
        assert!(rejection_gated_registry(2).validate().is_ok());
        assert!(score_gated_registry(Some(85)).validate().is_ok());
    }
}
