//! The ordered, validated list of stages a run walks through.

use super::{CriticDefinition, GateKind, StageDefinition};
use crate::context::{ExtractionRule, RunContext};
use crate::errors::{CheckpointError, ContractErrorInfo, PipelineValidationError};
use crate::prompt::TemplatePrompt;
use std::collections::HashSet;

/// Stages in execution order.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage in place.
    pub fn push(&mut self, stage: StageDefinition) {
        self.stages.push(stage);
    }

    /// Returns the stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Returns the index of the stage after `stage_id`.
    #[must_use]
    pub fn position_after(&self, stage_id: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.id == stage_id)
            .map(|idx| idx + 1)
    }

    /// The stage whose output becomes the final artifact.
    #[must_use]
    pub fn last(&self) -> Option<&StageDefinition> {
        self.stages.last()
    }

    /// Validates stage ids, output keys, inputs and thresholds.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Registry has no stages").with_error_info(
                ContractErrorInfo::new("REGISTRY-001-EMPTY", "Cannot run an empty registry")
                    .with_fix_hint("Add at least one stage before building the engine."),
            ));
        }

        let mut ids = HashSet::new();
        let mut produced: HashSet<&str> = HashSet::new();

        for stage in &self.stages {
            if stage.id.trim().is_empty() || stage.role.trim().is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' has a blank id or role",
                    stage.id
                ))
                .with_stages(vec![stage.id.clone()])
                .with_error_info(ContractErrorInfo::new(
                    "REGISTRY-002-BLANK",
                    "Stage ids and roles must not be blank",
                )));
            }

            if !ids.insert(stage.id.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Duplicate stage id '{}'",
                    stage.id
                ))
                .with_stages(vec![stage.id.clone()])
                .with_error_info(
                    ContractErrorInfo::new("REGISTRY-003-DUPLICATE_STAGE", "Stage ids must be unique")
                        .with_fix_hint("Rename one of the stages."),
                ));
            }

            for key in stage.referenced_keys() {
                if !produced.contains(key.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' reads output '{}' which no earlier stage produces",
                        stage.id, key
                    ))
                    .with_stages(vec![stage.id.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "REGISTRY-004-MISSING_INPUT",
                            format!("Output '{key}' is not available before '{}'", stage.id),
                        )
                        .with_fix_hint("Move the producing stage earlier or drop the reference."),
                    ));
                }
            }

            for key in stage.produced_keys() {
                if !produced.insert(key) {
                    return Err(PipelineValidationError::new(format!(
                        "Output key '{key}' is written by more than one stage"
                    ))
                    .with_stages(vec![stage.id.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "REGISTRY-005-DUPLICATE_OUTPUT",
                            "Output keys must be unique",
                        )
                        .with_fix_hint("Give each stage and critic its own output key."),
                    ));
                }
            }

            if let GateKind::Score(gate) = &stage.gate {
                if gate.threshold.is_some_and(|t| t > 100) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' has a score threshold above 100",
                        stage.id
                    ))
                    .with_stages(vec![stage.id.clone()])
                    .with_error_info(ContractErrorInfo::new(
                        "REGISTRY-006-THRESHOLD",
                        "Score thresholds are in 0..=100",
                    )));
                }
            }
        }

        Ok(())
    }

    /// Checks that a checkpointed context is a prefix of this registry and
    /// returns the index to resume from.
    pub fn resume_position(&self, ctx: &RunContext) -> Result<usize, CheckpointError> {
        let completed = ctx.completed_stages();
        if completed.len() > self.stages.len() {
            return Err(CheckpointError::RegistryMismatch(format!(
                "checkpoint lists {} completed stages, registry has {}",
                completed.len(),
                self.stages.len()
            )));
        }
        for (done, stage) in completed.iter().zip(&self.stages) {
            if *done != stage.id {
                return Err(CheckpointError::RegistryMismatch(format!(
                    "checkpoint completed '{done}' where registry expects '{}'",
                    stage.id
                )));
            }
            if !ctx.has_output(&stage.output_key) {
                return Err(CheckpointError::RegistryMismatch(format!(
                    "stage '{}' is completed but output '{}' is missing",
                    stage.id, stage.output_key
                )));
            }
        }
        Ok(completed.len())
    }

    /// The stock seven-stage creative production registry.
    ///
    /// `concept` is rejection-gated and locks `primary_entity` from a
    /// `Brand Name:` line; `script` is score-gated by an editor critic.
    pub fn creative_production() -> Result<Self, PipelineValidationError> {
        let brand = ExtractionRule::labeled("primary_entity", "Brand Name").map_err(|e| {
            PipelineValidationError::new(format!("invalid extraction rule: {e}"))
                .with_stages(vec!["concept".to_string()])
        })?;

        let registry = Self::new()
            .with_stage(
                StageDefinition::new(
                    "concept",
                    "You are a creative strategist who turns briefs into campaign concepts.",
                    "concept",
                    TemplatePrompt::new(
                        "Develop one campaign concept for the brief. Start with a line \
                         `Brand Name: <name>` naming the primary brand or product, then give \
                         the big idea in three sentences. If the brief cannot be served, say \
                         why and mark it [INVALID_PREMISE] or [POLICY_VIOLATION].",
                    ),
                )
                .with_rejection_gate()
                .with_extraction(brand)
                .with_knowledge(),
            )
            .with_stage(StageDefinition::new(
                "audience",
                "You are an audience researcher.",
                "audience",
                TemplatePrompt::new(
                    "Profile the audience for this concept: motivations, objections, and \
                     where they spend attention.",
                )
                .with_requires(["concept"]),
            ))
            .with_stage(StageDefinition::new(
                "outline",
                "You are a narrative architect.",
                "outline",
                TemplatePrompt::new(
                    "Outline the piece beat by beat for {constraint:primary_entity}, \
                     addressing the audience profile.",
                )
                .with_requires(["concept", "audience"]),
            ))
            .with_stage(
                StageDefinition::new(
                    "script",
                    "You are a scriptwriter.",
                    "script",
                    TemplatePrompt::new("Write the full script from the outline.")
                        .with_requires(["outline"]),
                )
                .with_score_gate(
                    CriticDefinition::new(
                        "You are an exacting script editor.",
                        "script_critique",
                        TemplatePrompt::new(
                            "Critique the script for hook, clarity, pacing and fit with the \
                             outline.",
                        )
                        .with_requires(["outline"]),
                    ),
                    None,
                ),
            )
            .with_stage(StageDefinition::new(
                "visuals",
                "You are an art director.",
                "visuals",
                TemplatePrompt::new("Describe the visual treatment shot by shot.")
                    .with_requires(["script"]),
            ))
            .with_stage(StageDefinition::new(
                "production_plan",
                "You are a producer.",
                "production_plan",
                TemplatePrompt::new(
                    "Plan the production: crew, locations, schedule and budget bands.",
                )
                .with_requires(["script", "visuals"]),
            ))
            .with_stage(StageDefinition::new(
                "final_package",
                "You are a creative director assembling the client package.",
                "final_package",
                TemplatePrompt::new(
                    "Assemble the final package: concept summary, script, visual treatment \
                     and production plan, in that order.",
                )
                .with_requires(["concept", "script", "visuals", "production_plan"]),
            ));

        registry.validate()?;
        Ok(registry)
    }
}
