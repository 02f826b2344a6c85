//! Sequential, checkpointing execution of the release stages.

use super::{ContextMode, PipelineResult, RunRequest, StageSpec, PIPELINE};
use crate::cancellation::CancellationToken;
use crate::config::{ReleaseConfig, RunOptions};
use crate::context::PersistedContext;
use crate::core::StageId;
use crate::errors::{FailureKind, ReleaseflowError, StageFailure};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::{StageEvent, Stopwatch};
use crate::stages::{standard_runners, StageContext, StagePorts, StageRunner};
use crate::store::ContextStore;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives the fixed stage sequence over a persisted context.
///
/// Stages run strictly one after another. After each success the merged
/// context is checkpointed before the next stage starts, so a later
/// invocation resumes past every stage that was recorded.
pub struct PipelineOrchestrator {
    runners: BTreeMap<StageId, Arc<dyn StageRunner>>,
    store: Arc<dyn ContextStore>,
    sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("runners", &self.runners.keys().collect::<Vec<_>>())
            .field("store", &self.store)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

/// Stages executed and skipped by one run.
#[derive(Debug, Default)]
struct Outcome {
    executed: Vec<StageId>,
    skipped: Vec<StageId>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator without runners.
    #[must_use]
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            runners: BTreeMap::new(),
            store,
            sink: Arc::new(NoOpEventSink),
            cancellation: CancellationToken::new(),
        }
    }

    /// Creates an orchestrator with the standard runner of every stage.
    #[must_use]
    pub fn with_ports(store: Arc<dyn ContextStore>, ports: &StagePorts) -> Self {
        Self::new(store).with_runners(standard_runners(ports))
    }

    /// Registers a runner, replacing any runner of the same stage.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn StageRunner>) -> Self {
        self.runners.insert(runner.stage(), runner);
        self
    }

    /// Registers several runners.
    #[must_use]
    pub fn with_runners(mut self, runners: impl IntoIterator<Item = Arc<dyn StageRunner>>) -> Self {
        for runner in runners {
            self.runners.insert(runner.stage(), runner);
        }
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the token that interrupts the run.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The token that interrupts the run.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The context store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Runs the requested stages.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure, a checkpoint failure, a store error
    /// while loading the context, or `Cancelled` when interrupted between
    /// stages. Stages checkpointed before the error stay recorded.
    pub async fn run(
        &self,
        config: &ReleaseConfig,
        options: &RunOptions,
        request: &RunRequest,
    ) -> Result<PipelineResult, ReleaseflowError> {
        let mut context = match self.prepare_context(config, request).await {
            Ok(context) => context,
            Err(err) => {
                error!(error = %err, "Could not prepare the pipeline context");
                self.sink
                    .emit(
                        PipelineEvent::PipelineFailed.as_str(),
                        Some(json!({ "error": err.to_string() })),
                    )
                    .await;
                return Err(err);
            }
        };
        let run_id = context.run_id();

        info!(
            run_id = %run_id,
            config = %config.directory().display(),
            mode = ?request.mode,
            completed = context.completed_stages().len(),
            "Pipeline started"
        );
        self.sink
            .emit(
                PipelineEvent::PipelineStarted.as_str(),
                Some(json!({
                    "run_id": run_id,
                    "stages": request.stages,
                    "resume": request.resume(),
                    "completed": context.completed_stages(),
                })),
            )
            .await;

        let timer = Stopwatch::start();
        match self.execute_stages(&mut context, config, options, request).await {
            Ok(outcome) => {
                let duration_ms = timer.elapsed_ms();
                info!(
                    run_id = %run_id,
                    executed = outcome.executed.len(),
                    skipped = outcome.skipped.len(),
                    duration_ms,
                    "Pipeline completed"
                );
                self.sink
                    .emit(
                        PipelineEvent::PipelineCompleted.as_str(),
                        Some(json!({
                            "run_id": run_id,
                            "executed": outcome.executed,
                            "skipped": outcome.skipped,
                            "duration_ms": duration_ms,
                        })),
                    )
                    .await;
                Ok(PipelineResult::from_context(
                    &context,
                    outcome.executed,
                    outcome.skipped,
                ))
            }
            Err(err) => {
                error!(run_id = %run_id, stage = ?err.stage(), error = %err, "Pipeline failed");
                self.sink
                    .emit(
                        PipelineEvent::PipelineFailed.as_str(),
                        Some(json!({
                            "run_id": run_id,
                            "stage": err.stage(),
                            "error": err.to_string(),
                            "recoverable": err.is_recoverable(),
                        })),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn prepare_context(
        &self,
        config: &ReleaseConfig,
        request: &RunRequest,
    ) -> Result<PersistedContext, ReleaseflowError> {
        let key = config.directory();
        let existing = match request.mode {
            ContextMode::Clean => {
                info!(config = %key.display(), "Discarding persisted context");
                self.store.clear(key).await?;
                None
            }
            ContextMode::Resume | ContextMode::Restart => self.store.load(key).await?,
        };

        let mut context = match existing {
            Some(context) if request.mode == ContextMode::Resume => {
                if context.signature() != config.signature() {
                    warn!(
                        recorded = %context.signature(),
                        current = %config.signature(),
                        "Configuration changed since the run started; resuming the recorded run"
                    );
                }
                debug!(completed = ?context.completed_stages(), "Resuming persisted context");
                return Ok(context);
            }
            Some(mut context) => {
                if let Some(first) = request.first_stage() {
                    info!(stage = %first, "Rewinding persisted context");
                    context.reset_from(first);
                }
                if first_is_configure(request) {
                    context.set_signature(config.signature());
                }
                context
            }
            None => PersistedContext::new(key, config.signature()),
        };

        context.next_revision();
        self.store.save(&context).await?;
        Ok(context)
    }

    async fn execute_stages(
        &self,
        context: &mut PersistedContext,
        config: &ReleaseConfig,
        options: &RunOptions,
        request: &RunRequest,
    ) -> Result<Outcome, ReleaseflowError> {
        let mut outcome = Outcome::default();
        let run_id = context.run_id();

        for spec in PIPELINE.iter().filter(|s| request.stages.contains(&s.id)) {
            let id = spec.id;
            if self.cancellation.is_cancelled() {
                let reason = self
                    .cancellation
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string());
                warn!(stage = %id, reason = %reason, "Pipeline cancelled before stage");
                return Err(ReleaseflowError::Cancelled(reason));
            }

            if request.skipped.contains(&id) {
                self.skip(run_id, id, "skip flag").await;
                outcome.skipped.push(id);
                continue;
            }
            let forced = request.forced.contains(&id);
            if context.is_completed(id) && !forced {
                self.skip(run_id, id, "already completed").await;
                outcome.skipped.push(id);
                continue;
            }

            if let Err(failure) = self.check_preconditions(spec, context) {
                return Err(self.fail(run_id, failure).await);
            }
            let Some(runner) = self.runners.get(&id) else {
                let failure =
                    StageFailure::configuration(id, format!("no runner registered for stage '{id}'"));
                return Err(self.fail(run_id, failure).await);
            };

            info!(stage = %id, "Stage started");
            self.stage_event(StageEvent::started(run_id, id)).await;

            let timer = Stopwatch::start();
            let result = {
                let stage_ctx = StageContext {
                    context,
                    config,
                    options,
                    policy: request.policy,
                    cancellation: &self.cancellation,
                };
                runner
                    .execute(&stage_ctx)
                    .instrument(info_span!("stage", stage = %id, run_id = %run_id))
                    .await
            };

            let delta = match result {
                Ok(delta) => delta,
                Err(failure) => {
                    self.persist_partial(context, &failure).await;
                    return Err(self.fail(run_id, failure).await);
                }
            };

            let mut next = context.clone();
            if forced && next.is_completed(id) {
                next.clear_outputs_of(id);
            }
            if let Err(conflict) = next.apply(delta) {
                let failure = StageFailure::new(id, FailureKind::Integrity, conflict.to_string());
                return Err(self.fail(run_id, failure).await);
            }
            next.mark_completed(id);
            next.next_revision();
            if let Err(source) = self.store.save(&next).await {
                error!(stage = %id, error = %source, "Checkpoint failed");
                self.stage_event(StageEvent::failed(run_id, id, source.to_string()))
                    .await;
                return Err(ReleaseflowError::Checkpoint { stage: id, source });
            }
            *context = next;

            let duration_ms = timer.elapsed_ms();
            info!(stage = %id, duration_ms, revision = context.revision(), "Stage completed");
            self.stage_event(StageEvent::completed(run_id, id, duration_ms))
                .await;
            outcome.executed.push(id);
        }

        Ok(outcome)
    }

    fn check_preconditions(
        &self,
        spec: &StageSpec,
        context: &PersistedContext,
    ) -> Result<(), StageFailure> {
        match spec.requires.iter().find(|field| !context.has(**field)) {
            Some(field) => Err(StageFailure::precondition(spec.id, *field)),
            None => Ok(()),
        }
    }

    async fn persist_partial(&self, context: &mut PersistedContext, failure: &StageFailure) {
        let Some(partial) = failure.partial.as_deref() else {
            return;
        };
        let mut next = context.clone();
        if let Err(conflict) = next.apply(partial.clone()) {
            warn!(stage = %failure.stage, error = %conflict, "Discarding partial results");
            return;
        }
        next.next_revision();
        match self.store.save(&next).await {
            Ok(()) => {
                info!(stage = %failure.stage, "Partial results persisted");
                *context = next;
            }
            Err(err) => warn!(stage = %failure.stage, error = %err, "Could not persist partial results"),
        }
    }

    async fn skip(&self, run_id: uuid::Uuid, id: StageId, reason: &str) {
        info!(stage = %id, reason, "Stage skipped");
        self.stage_event(StageEvent::skipped(run_id, id, reason)).await;
    }

    async fn fail(&self, run_id: uuid::Uuid, failure: StageFailure) -> ReleaseflowError {
        error!(
            stage = %failure.stage,
            kind = %failure.kind,
            recoverable = failure.recoverable,
            "{}",
            failure.message
        );
        self.stage_event(StageEvent::failed(run_id, failure.stage, failure.message.clone()))
            .await;
        ReleaseflowError::Stage(failure)
    }

    async fn stage_event(&self, event: StageEvent) {
        self.sink.emit(event.event_type(), Some(event.to_json())).await;
    }
}

fn first_is_configure(request: &RunRequest) -> bool {
    request.first_stage() == Some(StageId::Configure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextDelta;
    use crate::core::ContextField;
    use crate::events::CollectingEventSink;
    use crate::store::InMemoryContextStore;
    use crate::testing::{sample_config, MockRunner};
    use pretty_assertions::assert_eq;

    struct Fixture {
        config: ReleaseConfig,
        store: Arc<InMemoryContextStore>,
        sink: Arc<CollectingEventSink>,
        runners: Vec<Arc<MockRunner>>,
    }

    impl Fixture {
        fn new() -> Self {
            let runners = StageId::ALL
                .into_iter()
                .map(|stage| Arc::new(MockRunner::producing(stage)))
                .collect();
            Self {
                config: sample_config("/configs/widget").unwrap(),
                store: Arc::new(InMemoryContextStore::new()),
                sink: Arc::new(CollectingEventSink::new()),
                runners,
            }
        }

        fn runner(&self, stage: StageId) -> &Arc<MockRunner> {
            &self.runners[stage.position()]
        }

        fn orchestrator(&self) -> PipelineOrchestrator {
            PipelineOrchestrator::new(self.store.clone())
                .with_runners(self.runners.iter().map(|r| r.clone() as Arc<dyn StageRunner>))
                .with_event_sink(self.sink.clone())
        }

        async fn run(&self, options: &RunOptions) -> Result<PipelineResult, ReleaseflowError> {
            self.orchestrator()
                .run(&self.config, options, &RunRequest::full(options))
                .await
        }

        async fn stored(&self) -> PersistedContext {
            self.store.load(self.config.directory()).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_full_run_executes_every_stage_once() {
        let fixture = Fixture::new();

        let result = fixture.run(&RunOptions::new()).await.unwrap();

        assert_eq!(result.executed, StageId::ALL.to_vec());
        assert!(fixture.runners.iter().all(|r| r.call_count() == 1));
        let stored = fixture.stored().await;
        assert_eq!(stored.completed_stages(), StageId::ALL.as_slice());
        assert!(stored.is_released());
        assert_eq!(fixture.sink.event_types().first().map(String::as_str), Some("pipeline.started"));
        assert_eq!(fixture.sink.event_types().last().map(String::as_str), Some("pipeline.completed"));
    }

    #[tokio::test]
    async fn test_skipped_stage_never_runs() {
        let fixture = Fixture::new();
        let options = RunOptions {
            skip_javadoc: true,
            ..RunOptions::default()
        };

        let result = fixture.run(&options).await.unwrap();

        assert_eq!(fixture.runner(StageId::JavadocGeneration).call_count(), 0);
        assert_eq!(result.skipped, vec![StageId::JavadocGeneration]);
        let stored = fixture.stored().await;
        assert!(!stored.is_completed(StageId::JavadocGeneration));
        assert!(stored.document(crate::core::DocumentKind::Javadoc).is_none());
        assert_eq!(fixture.sink.stages_for("stage.skipped"), vec!["javadoc"]);
    }

    #[tokio::test]
    async fn test_resume_continues_after_last_checkpoint() {
        let fixture = Fixture::new();
        fixture
            .runner(StageId::LicensesGeneration)
            .fail_with(FailureKind::Remote, "license service unavailable");

        let err = fixture.run(&RunOptions::new()).await.unwrap_err();
        assert_eq!(err.stage(), Some(StageId::LicensesGeneration));
        let stored = fixture.stored().await;
        assert_eq!(stored.completed_stages(), &StageId::ALL[..5]);

        fixture.runner(StageId::LicensesGeneration).succeed();
        fixture.run(&RunOptions::new()).await.unwrap();

        for stage in &StageId::ALL[..5] {
            assert_eq!(fixture.runner(*stage).call_count(), 1, "{stage} re-ran");
        }
        assert_eq!(fixture.runner(StageId::LicensesGeneration).call_count(), 2);
        assert_eq!(fixture.runner(StageId::Release).call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_prior_output_is_precondition_failure() {
        let fixture = Fixture::new();
        let options = RunOptions {
            skip_pnc_update: true,
            ..RunOptions::default()
        };

        let err = fixture.run(&options).await.unwrap_err();

        let failure = err.as_stage_failure().unwrap();
        assert_eq!(failure.stage, StageId::Build);
        assert_eq!(failure.kind, FailureKind::Precondition);
        assert!(failure.message.contains(&ContextField::FullVersion.to_string()));
        assert_eq!(fixture.runner(StageId::Build).call_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_results_are_persisted_without_completion() {
        let fixture = Fixture::new();
        let partial = ContextDelta::new().with_builds(
            &fixture.config.group,
            vec![crate::core::ComponentBuild::success("core", "core-1", "d")],
        );
        fixture.runner(StageId::Build).fail_with_partial(
            StageFailure::new(StageId::Build, FailureKind::PartialBuild, "web failed")
                .with_partial(partial),
        );

        fixture.run(&RunOptions::new()).await.unwrap_err();

        let stored = fixture.stored().await;
        assert!(!stored.is_completed(StageId::Build));
        assert!(stored.build_group_result().unwrap().get("core").is_some());
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_reported() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator();
        let options = RunOptions::new();
        let request = RunRequest::single(StageId::Configure, &options);
        orchestrator.run(&fixture.config, &options, &request).await.unwrap();
        fixture.store.fail_saves(true);

        let mut request = RunRequest::single(StageId::Build, &options);
        request.mode = ContextMode::Resume;
        let err = orchestrator.run(&fixture.config, &options, &request).await.unwrap_err();

        assert!(matches!(err, ReleaseflowError::Checkpoint { stage: StageId::Build, .. }));
        assert!(!err.is_recoverable());
        fixture.store.fail_saves(false);
        assert!(!fixture.stored().await.is_completed(StageId::Build));
    }

    #[tokio::test]
    async fn test_clean_discards_completed_stages() {
        let fixture = Fixture::new();
        fixture.run(&RunOptions::new()).await.unwrap();

        fixture.run(&RunOptions::new().with_clean(true)).await.unwrap();

        assert!(fixture.runners.iter().all(|r| r.call_count() == 2));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_next_stage() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator();
        orchestrator.cancellation().cancel("shutdown");

        let err = orchestrator
            .run(&fixture.config, &RunOptions::new(), &RunRequest::full(&RunOptions::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseflowError::Cancelled(ref reason) if reason == "shutdown"));
        assert!(fixture.runners.iter().all(|r| r.call_count() == 0));
    }

    #[tokio::test]
    async fn test_build_restart_rewinds_later_stages() {
        let fixture = Fixture::new();
        fixture.run(&RunOptions::new()).await.unwrap();
        let orchestrator = fixture.orchestrator();
        let options = RunOptions::new();

        let result = orchestrator
            .run(&fixture.config, &options, &RunRequest::single(StageId::Build, &options))
            .await
            .unwrap();

        assert_eq!(result.executed, vec![StageId::Build]);
        let stored = fixture.stored().await;
        assert_eq!(stored.completed_stages(), &[StageId::Configure, StageId::Build]);
        assert!(!stored.is_released());
    }

    #[tokio::test]
    async fn test_forced_single_stage_reruns_completed_stage() {
        let fixture = Fixture::new();
        fixture.run(&RunOptions::new()).await.unwrap();
        let options = RunOptions::new();

        fixture
            .orchestrator()
            .run(
                &fixture.config,
                &options,
                &RunRequest::single(StageId::LicensesGeneration, &options),
            )
            .await
            .unwrap();

        assert_eq!(fixture.runner(StageId::LicensesGeneration).call_count(), 2);
        assert!(fixture.stored().await.is_released());
    }

    #[tokio::test]
    async fn test_conflicting_delta_is_integrity_failure() {
        let fixture = Fixture::new();
        fixture.run(&RunOptions::new()).await.unwrap();
        fixture
            .runner(StageId::Build)
            .respond_with(ContextDelta::new().with_full_version("9.9.ER1"));
        let options = RunOptions::new();
        let mut request = RunRequest::single(StageId::Build, &options);
        request.mode = ContextMode::Resume;

        let err = fixture
            .orchestrator()
            .run(&fixture.config, &options, &request)
            .await
            .unwrap_err();

        let failure = err.as_stage_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Integrity);
        assert_eq!(fixture.stored().await.full_version(), Some("1.0.CR1"));
    }
}
