//! Sequential, gated, checkpointed execution of a stage registry.

use super::{CriticDefinition, EngineConfig, GateKind, StageDefinition, StageRegistry};
use crate::cancellation::CancellationToken;
use crate::checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
use crate::context::{RunContext, RunOptions};
use crate::core::{FinalArtifact, GateDecision, RunStatus, UnresolvedGate};
use crate::errors::{CheckpointError, ConfigError, StagegateError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::gates::{
    Feedback, GateController, InvokeError, PivotLoop, PivotParticipant, PivotRequest,
    RevisionLoop, RevisionParticipant,
};
use crate::gateway::{InvocationOptions, KnowledgeRetriever, KnowledgeSnippet, ReasoningGateway};
use crate::history::{RunHistorySink, RunRecord};
use crate::observability::{run_span, stage_span, SpanTimer};
use crate::prompt::{Directive, PromptBuilder, PromptComposer};
use crate::signals::SignalExtractor;
use crate::utils::generate_run_id;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// A run that unwound on cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledRun {
    /// The run identifier.
    pub run_id: Uuid,
    /// The first reason given for cancellation.
    pub reason: String,
    /// The last stage whose output was kept.
    pub last_completed_stage: Option<String>,
    /// Whether a checkpoint remains available for resumption.
    pub checkpoint_retained: bool,
}

/// How a run ended, short of an error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run produced an artifact.
    Completed(FinalArtifact),
    /// The run was cancelled.
    Cancelled(CancelledRun),
}

impl RunOutcome {
    /// Returns the artifact of a completed run.
    #[must_use]
    pub fn artifact(&self) -> Option<&FinalArtifact> {
        match self {
            Self::Completed(artifact) => Some(artifact),
            Self::Cancelled(_) => None,
        }
    }

    /// Consumes the outcome, returning the artifact of a completed run.
    #[must_use]
    pub fn into_artifact(self) -> Option<FinalArtifact> {
        match self {
            Self::Completed(artifact) => Some(artifact),
            Self::Cancelled(_) => None,
        }
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Why a stage did not complete.
enum StageFailure {
    Cancelled(String),
    Error(StagegateError),
}

impl StageFailure {
    fn from_invoke(stage_id: &str, err: InvokeError) -> Self {
        match err {
            InvokeError::Cancelled(reason) => Self::Cancelled(reason),
            InvokeError::Gateway(source) => Self::Error(StagegateError::gateway(stage_id, source)),
        }
    }
}

impl From<StagegateError> for StageFailure {
    fn from(err: StagegateError) -> Self {
        Self::Error(err)
    }
}

/// Runs seed inputs through a stage registry.
///
/// Stages run strictly in order. Each stage's task text is composed from
/// the run context, sent to the gateway, gated, and recorded; a checkpoint
/// is written after every stage and cleared once the run completes.
///
/// The cancellation token is shared by every run of the engine and checked
/// on both sides of each gateway call.
pub struct PipelineEngine {
    registry: Arc<StageRegistry>,
    gateway: Arc<dyn ReasoningGateway>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    checkpoints: Option<CheckpointManager>,
    history: Option<Arc<dyn RunHistorySink>>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    config: EngineConfig,
    composer: PromptComposer,
    controller: GateController,
}

impl PipelineEngine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> PipelineEngineBuilder {
        PipelineEngineBuilder::default()
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the shared cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// Requests cancellation of every in-flight run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// Runs a seed from the first stage.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options, a gateway failure outside a
    /// bounded loop, a checkpoint write failure, or an exhausted gate under
    /// the hard-fail policy. Cancellation is not an error.
    pub async fn submit(
        &self,
        seed: impl Into<String>,
        options: RunOptions,
    ) -> Result<RunOutcome, StagegateError> {
        options.validate()?;
        let ctx = RunContext::new(generate_run_id(), seed, options);
        self.execute(ctx, 0, false).await
    }

    /// Returns the checkpoint waiting in the engine's slot, if any.
    pub async fn pending_checkpoint(&self) -> Result<Option<Checkpoint>, StagegateError> {
        match &self.checkpoints {
            Some(manager) => Ok(manager.load().await?),
            None => Ok(None),
        }
    }

    /// Resumes the run checkpointed in the engine's slot.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] if the slot is empty, and
    /// [`ConfigError`] if the engine has no checkpoint store.
    pub async fn resume(&self, seed: &str) -> Result<RunOutcome, StagegateError> {
        let manager = self.checkpoints.as_ref().ok_or_else(|| {
            ConfigError::invalid("cannot resume: engine has no checkpoint store")
        })?;
        let checkpoint = manager.load().await?.ok_or_else(|| CheckpointError::NotFound {
            slot: manager.slot().to_string(),
        })?;
        self.resume_from(seed, checkpoint).await
    }

    /// Resumes from an explicit checkpoint, strictly after its last stage.
    pub async fn resume_from(
        &self,
        seed: &str,
        checkpoint: Checkpoint,
    ) -> Result<RunOutcome, StagegateError> {
        checkpoint.verify_seed(seed, self.config.strict_resume)?;
        let start = self.registry.resume_position(&checkpoint.context)?;

        let mut ctx = checkpoint.context;
        ctx.options = checkpoint.directives;
        info!(
            run_id = %ctx.run_id,
            after = %checkpoint.last_completed_stage,
            "Resuming run"
        );
        self.execute(ctx, start, true).await
    }

    /// Resumes a pending checkpoint if one exists, otherwise submits fresh.
    ///
    /// When resuming, `options` are ignored in favour of the checkpointed
    /// directives.
    pub async fn submit_or_resume(
        &self,
        seed: impl Into<String>,
        options: RunOptions,
    ) -> Result<RunOutcome, StagegateError> {
        let seed = seed.into();
        match self.pending_checkpoint().await? {
            Some(checkpoint) => self.resume_from(&seed, checkpoint).await,
            None => self.submit(seed, options).await,
        }
    }

    async fn execute(
        &self,
        ctx: RunContext,
        start: usize,
        resumed: bool,
    ) -> Result<RunOutcome, StagegateError> {
        let span = run_span(ctx.run_id, resumed);
        self.execute_inner(ctx, start, resumed).instrument(span).await
    }

    async fn execute_inner(
        &self,
        mut ctx: RunContext,
        start: usize,
        resumed: bool,
    ) -> Result<RunOutcome, StagegateError> {
        let timer = SpanTimer::start();
        ctx.status = RunStatus::Running;
        let started = if resumed {
            events::RUN_RESUMED
        } else {
            events::RUN_STARTED
        };
        self.events
            .emit(
                started,
                Some(serde_json::json!({
                    "run_id": ctx.run_id,
                    "from_stage": self.registry.stages().get(start).map(|s| s.id.as_str()),
                    "stage_count": self.registry.len(),
                })),
            )
            .await;

        for stage in &self.registry.stages()[start..] {
            if let Some(reason) = self.cancel_reason() {
                return Ok(self.cancelled(ctx, reason).await);
            }

            self.events
                .emit(
                    events::STAGE_STARTED,
                    Some(serde_json::json!({"run_id": ctx.run_id, "stage": stage.id})),
                )
                .await;

            let result = self
                .run_stage(stage, &mut ctx)
                .instrument(stage_span(&stage.id, stage.gate.label()))
                .await;
            match result {
                Ok(()) => {}
                Err(StageFailure::Cancelled(reason)) => {
                    return Ok(self.cancelled(ctx, reason).await);
                }
                Err(StageFailure::Error(err)) => return Err(self.failed(&mut ctx, err).await),
            }

            ctx.mark_stage_completed(stage.id.clone());
            self.events
                .emit(
                    events::STAGE_COMPLETED,
                    Some(serde_json::json!({"run_id": ctx.run_id, "stage": stage.id})),
                )
                .await;

            if let Some(manager) = &self.checkpoints {
                if let Err(err) = manager.save(&ctx).await {
                    return Err(self.failed(&mut ctx, err.into()).await);
                }
                self.events
                    .emit(
                        events::CHECKPOINT_SAVED,
                        Some(serde_json::json!({
                            "run_id": ctx.run_id,
                            "stage": stage.id,
                            "slot": manager.slot(),
                        })),
                    )
                    .await;
            }
        }

        let artifact = self.finish(ctx).await;
        info!(
            run_id = %artifact.run_id,
            duration_ms = timer.elapsed_ms(),
            unresolved = artifact.unresolved_gates.len(),
            "Run completed"
        );
        Ok(RunOutcome::Completed(artifact))
    }

    async fn run_stage(
        &self,
        stage: &StageDefinition,
        ctx: &mut RunContext,
    ) -> Result<(), StageFailure> {
        let knowledge = self.knowledge_for(stage, ctx).await;
        let options = self.invocation_options(stage);
        let budget = ctx.options.attempt_budget();

        let canonical = match &stage.gate {
            GateKind::None => {
                let invoker = StageInvoker::new(self, stage, ctx, &knowledge, &options);
                invoker
                    .call(&stage.role, stage.prompt.as_ref(), None)
                    .await
                    .map_err(|e| StageFailure::from_invoke(&stage.id, e))?
            }
            GateKind::Rejection => {
                let mut invoker = StageInvoker::new(self, stage, ctx, &knowledge, &options);
                let outcome = PivotLoop::new(&self.controller, &stage.id, budget)
                    .run(&mut invoker)
                    .await
                    .map_err(|e| StageFailure::from_invoke(&stage.id, e))?;

                // The last attempt of the budget is never retried.
                for attempt in outcome
                    .attempts
                    .iter()
                    .filter(|a| !a.is_accepted() && a.index < budget)
                {
                    self.events.try_emit(
                        events::GATE_RETRY,
                        Some(serde_json::json!({
                            "run_id": ctx.run_id,
                            "stage": stage.id,
                            "attempt": attempt.index,
                            "category": attempt.rejection,
                        })),
                    );
                }
                if let Some(gate) = outcome.unresolved(&stage.id) {
                    self.resolve_unresolved(ctx, gate).await?;
                }
                outcome.text
            }
            GateKind::Score(gate) => {
                let threshold = gate.threshold.unwrap_or(self.config.score_threshold);
                let mut invoker = RevisionInvoker {
                    base: StageInvoker::new(self, stage, ctx, &knowledge, &options),
                    critic: &gate.critic,
                    threshold,
                };
                let outcome = RevisionLoop::new(&self.controller, &stage.id, threshold, budget)
                    .run(&mut invoker)
                    .await
                    .map_err(|e| StageFailure::from_invoke(&stage.id, e))?;

                for attempt in &outcome.attempts {
                    self.events.try_emit(
                        events::REVISION_ATTEMPT,
                        Some(serde_json::json!({
                            "run_id": ctx.run_id,
                            "stage": stage.id,
                            "attempt": attempt.index,
                            "score": attempt.score,
                            "threshold": threshold,
                            "is_best": attempt.is_best,
                        })),
                    );
                }
                if let Some(gate) = outcome.unresolved(&stage.id) {
                    self.resolve_unresolved(ctx, gate).await?;
                }

                let best = outcome.best().clone();
                ctx.record_output(gate.critic.output_key.clone(), best.critique)
                    .map_err(StagegateError::from)?;
                ctx.record_revisions(stage.id.clone(), outcome.attempts);
                best.draft
            }
        };

        self.accept(stage, ctx, canonical)?;
        Ok(())
    }

    /// Records a stage's canonical output and derives constraints from it.
    fn accept(
        &self,
        stage: &StageDefinition,
        ctx: &mut RunContext,
        text: String,
    ) -> Result<(), StagegateError> {
        for rule in &stage.extraction {
            if let Some(value) = rule.apply(&text) {
                if ctx.constraints.set_if_absent(rule.constraint(), value.clone()) {
                    info!(stage = %stage.id, constraint = rule.constraint(), value = %value, "Constraint locked");
                } else {
                    debug!(stage = %stage.id, constraint = rule.constraint(), "Constraint already locked");
                }
            }
        }
        ctx.record_output(stage.output_key.clone(), text)?;
        Ok(())
    }

    async fn resolve_unresolved(
        &self,
        ctx: &mut RunContext,
        gate: UnresolvedGate,
    ) -> Result<(), StageFailure> {
        match GateController::resolve_exhausted(ctx.options.on_exhausted) {
            GateDecision::Halt => Err(StageFailure::Error(StagegateError::GateExhausted {
                stage: gate.stage_id.clone(),
                state: gate,
            })),
            _ => {
                warn!(gate = %gate, "Proceeding past unresolved gate");
                self.events
                    .emit(
                        events::GATE_UNRESOLVED,
                        Some(serde_json::json!({
                            "run_id": ctx.run_id,
                            "gate": gate,
                        })),
                    )
                    .await;
                ctx.annotate_unresolved(gate);
                Ok(())
            }
        }
    }

    async fn knowledge_for(&self, stage: &StageDefinition, ctx: &RunContext) -> Vec<KnowledgeSnippet> {
        let Some(retriever) = self.retriever.as_ref().filter(|_| stage.uses_knowledge) else {
            return Vec::new();
        };
        match retriever.search(&ctx.seed, self.config.knowledge_top_k).await {
            Ok(mut snippets) => {
                snippets.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
                snippets.truncate(self.config.knowledge_top_k);
                debug!(stage = %stage.id, count = snippets.len(), "Knowledge retrieved");
                snippets
            }
            Err(err) => {
                debug!(stage = %stage.id, error = %err, "Knowledge unavailable, omitting");
                Vec::new()
            }
        }
    }

    fn invocation_options(&self, stage: &StageDefinition) -> InvocationOptions {
        self.config
            .capabilities
            .iter()
            .chain(&stage.capabilities)
            .fold(InvocationOptions::new(), |opts, cap| opts.with_capability(cap.clone()))
    }

    fn cancel_reason(&self) -> Option<String> {
        self.cancel
            .is_set()
            .then(|| self.cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
    }

    /// One gateway call with cancellation checked on both edges.
    async fn invoke(
        &self,
        role: &str,
        task: &str,
        options: &InvocationOptions,
    ) -> Result<String, InvokeError> {
        if let Some(reason) = self.cancel_reason() {
            return Err(InvokeError::Cancelled(reason));
        }
        let text = self.gateway.invoke(role, task, options).await?;
        if let Some(reason) = self.cancel_reason() {
            debug!("Discarding gateway result after cancellation");
            return Err(InvokeError::Cancelled(reason));
        }
        Ok(text)
    }

    async fn cancelled(&self, mut ctx: RunContext, reason: String) -> RunOutcome {
        ctx.status = RunStatus::Cancelled;
        let last = ctx.last_completed_stage().map(str::to_string);
        let checkpoint_retained = self.checkpoints.is_some() && last.is_some();
        info!(run_id = %ctx.run_id, reason = %reason, last_stage = ?last, "Run cancelled");
        self.events
            .emit(
                events::RUN_CANCELLED,
                Some(serde_json::json!({
                    "run_id": ctx.run_id,
                    "reason": reason,
                    "last_completed_stage": last,
                })),
            )
            .await;
        RunOutcome::Cancelled(CancelledRun {
            run_id: ctx.run_id,
            reason,
            last_completed_stage: last,
            checkpoint_retained,
        })
    }

    async fn failed(&self, ctx: &mut RunContext, err: StagegateError) -> StagegateError {
        ctx.status = RunStatus::Failed;
        warn!(run_id = %ctx.run_id, error = %err, "Run failed");
        self.events
            .emit(
                events::RUN_FAILED,
                Some(serde_json::json!({
                    "run_id": ctx.run_id,
                    "error": err.to_dict(),
                    "last_completed_stage": ctx.last_completed_stage(),
                })),
            )
            .await;
        err
    }

    async fn finish(&self, mut ctx: RunContext) -> FinalArtifact {
        ctx.status = RunStatus::Completed;
        let text = self
            .registry
            .last()
            .and_then(|stage| ctx.output(&stage.output_key))
            .unwrap_or_default()
            .to_string();

        let artifact = FinalArtifact {
            run_id: ctx.run_id,
            seed: ctx.seed.clone(),
            text,
            outputs: ctx.outputs().clone(),
            constraints: ctx.constraints.to_map(),
            unresolved_gates: ctx.unresolved_gates,
            revision_history: ctx.revision_history,
            started_at: ctx.started_at,
            completed_at: Utc::now(),
        };

        if let Some(manager) = &self.checkpoints {
            if let Err(err) = manager.clear().await {
                warn!(error = %err, "Failed to clear checkpoint after completion");
            }
        }
        if let Some(history) = &self.history {
            if let Err(err) = history.append(RunRecord::from_artifact(&artifact)).await {
                warn!(error = %err, "Failed to append run history");
            }
        }

        self.events
            .emit(
                events::RUN_COMPLETED,
                Some(serde_json::json!({
                    "run_id": artifact.run_id,
                    "unresolved_gates": artifact.unresolved_gates.len(),
                })),
            )
            .await;
        artifact
    }
}

impl fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("stages", &self.registry.len())
            .field("checkpoints", &self.checkpoints)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Calls the gateway on behalf of one stage.
struct StageInvoker<'e> {
    engine: &'e PipelineEngine,
    stage: &'e StageDefinition,
    ctx: &'e RunContext,
    knowledge: &'e [KnowledgeSnippet],
    options: &'e InvocationOptions,
}

impl<'e> StageInvoker<'e> {
    fn new(
        engine: &'e PipelineEngine,
        stage: &'e StageDefinition,
        ctx: &'e RunContext,
        knowledge: &'e [KnowledgeSnippet],
        options: &'e InvocationOptions,
    ) -> Self {
        Self {
            engine,
            stage,
            ctx,
            knowledge,
            options,
        }
    }

    async fn call(
        &self,
        role: &str,
        prompt: &dyn PromptBuilder,
        directive: Option<&Directive>,
    ) -> Result<String, InvokeError> {
        let task = self
            .engine
            .composer
            .compose(self.ctx, prompt, self.knowledge, directive);
        self.engine.invoke(role, &task, self.options).await
    }
}

#[async_trait]
impl<'e> PivotParticipant for StageInvoker<'e> {
    async fn attempt(&mut self, pivot: Option<&PivotRequest>) -> Result<String, InvokeError> {
        let directive = pivot.map(|p| Directive::Pivot {
            category: p.category,
            rejected: p.rejected.clone(),
        });
        self.call(&self.stage.role, self.stage.prompt.as_ref(), directive.as_ref())
            .await
    }
}

/// Calls the producer and critic of a score-gated stage.
struct RevisionInvoker<'e> {
    base: StageInvoker<'e>,
    critic: &'e CriticDefinition,
    threshold: u8,
}

#[async_trait]
impl<'e> RevisionParticipant for RevisionInvoker<'e> {
    async fn draft(&mut self, feedback: Option<&Feedback>) -> Result<String, InvokeError> {
        let directive = feedback.map(|f| Directive::Revise {
            draft: f.draft.clone(),
            critique: f.critique.clone(),
            score: f.score,
            threshold: f.threshold,
        });
        let stage = self.base.stage;
        self.base
            .call(&stage.role, stage.prompt.as_ref(), directive.as_ref())
            .await
    }

    async fn critique(&mut self, draft: &str) -> Result<String, InvokeError> {
        let directive = Directive::Review {
            draft: draft.to_string(),
            threshold: self.threshold,
        };
        self.base
            .call(&self.critic.role, self.critic.prompt.as_ref(), Some(&directive))
            .await
    }
}

/// Builder for [`PipelineEngine`].
#[derive(Default)]
pub struct PipelineEngineBuilder {
    registry: Option<StageRegistry>,
    gateway: Option<Arc<dyn ReasoningGateway>>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    history: Option<Arc<dyn RunHistorySink>>,
    events: Option<Arc<dyn EventSink>>,
    cancel: Option<Arc<CancellationToken>>,
    config: EngineConfig,
}

impl PipelineEngineBuilder {
    /// Sets the stage registry.
    #[must_use]
    pub fn registry(mut self, registry: StageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the reasoning gateway.
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn ReasoningGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets the knowledge retriever.
    #[must_use]
    pub fn retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Enables checkpointing into `store` under the configured slot.
    #[must_use]
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Sets the run history sink.
    #[must_use]
    pub fn history(mut self, history: Arc<dyn RunHistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shares an existing cancellation token.
    #[must_use]
    pub fn cancellation_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or gateway is missing, the registry
    /// fails validation, or the configuration is invalid.
    pub fn build(self) -> Result<PipelineEngine, StagegateError> {
        let registry = self
            .registry
            .ok_or_else(|| ConfigError::invalid("engine requires a stage registry"))?;
        registry.validate()?;
        let gateway = self
            .gateway
            .ok_or_else(|| ConfigError::invalid("engine requires a reasoning gateway"))?;
        self.config.validate()?;

        let checkpoints = self
            .checkpoint_store
            .map(|store| CheckpointManager::new(store, self.config.checkpoint_slot.clone()));
        let composer = PromptComposer::new().with_max_prior_chars(self.config.max_prior_chars);

        Ok(PipelineEngine {
            registry: Arc::new(registry),
            gateway,
            retriever: self.retriever,
            checkpoints,
            history: self.history,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            cancel: self.cancel.unwrap_or_default(),
            config: self.config,
            composer,
            controller: GateController::new(SignalExtractor::new(true)),
        })
    }
}
