//! Command-level entry points over the orchestrator.
//!
//! Each method corresponds to one command: it loads the configuration of a
//! directory, translates the run options into a [`RunRequest`] and runs the
//! orchestrator against the store of that configuration.

use crate::cancellation::CancellationToken;
use crate::config::{ReleaseConfig, RunOptions};
use crate::context::Progress;
use crate::core::{BuildGroupResult, DocumentKind, StageId};
use crate::errors::ReleaseflowError;
use crate::events::{EventSink, LoggingEventSink};
use crate::pipeline::{PipelineOrchestrator, PipelineResult, RunRequest};
use crate::stages::StagePorts;
use crate::store::{ContextStore, FsContextStore};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Summary returned by `run` and `build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    /// Resolved product version.
    pub full_version: Option<String>,
    /// Build outcomes of the group.
    pub build_group: Option<BuildGroupResult>,
    /// Release directory name.
    pub release_dir_name: Option<String>,
    /// Local release directory.
    pub release_path: Option<PathBuf>,
}

impl RunOutput {
    fn new(config: &ReleaseConfig, result: PipelineResult) -> Self {
        let release_dir_name = result
            .full_version
            .as_deref()
            .map(|v| config.release_dir_name(v));
        let release_path = result.full_version.as_deref().map(|v| config.release_path(v));
        Self {
            full_version: result.full_version,
            build_group: result.build_group_result,
            release_dir_name,
            release_path,
        }
    }
}

/// Translates commands into orchestrator runs.
pub struct CommandFacade {
    ports: StagePorts,
    sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
    store: Option<Arc<dyn ContextStore>>,
}

impl fmt::Debug for CommandFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFacade")
            .field("ports", &self.ports)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CommandFacade {
    /// Creates a facade persisting contexts under each configuration's target dir.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self {
            ports,
            sink: Arc::new(LoggingEventSink::default()),
            cancellation: CancellationToken::new(),
            store: None,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the token that interrupts runs.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Uses one store for every configuration.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The token that interrupts runs.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Loads and validates the configuration of a directory.
    ///
    /// # Errors
    ///
    /// Returns the configuration error.
    pub fn load_config(&self, directory: &Path) -> Result<ReleaseConfig, ReleaseflowError> {
        Ok(ReleaseConfig::load(directory)?)
    }

    fn store_for(&self, config: &ReleaseConfig) -> Arc<dyn ContextStore> {
        self.store.clone().unwrap_or_else(|| {
            Arc::new(FsContextStore::in_target_dir(config.target_dir())) as Arc<dyn ContextStore>
        })
    }

    fn orchestrator(&self, config: &ReleaseConfig) -> PipelineOrchestrator {
        PipelineOrchestrator::with_ports(self.store_for(config), &self.ports)
            .with_event_sink(Arc::clone(&self.sink))
            .with_cancellation(self.cancellation.clone())
    }

    async fn execute(
        &self,
        directory: &Path,
        options: &RunOptions,
        request: RunRequest,
    ) -> Result<(ReleaseConfig, PipelineResult), ReleaseflowError> {
        let config = self.load_config(directory)?;
        info!(
            config = %directory.display(),
            stages = request.stages.len(),
            policy = %request.policy,
            "Invoking pipeline"
        );
        let result = self.orchestrator(&config).run(&config, options, &request).await?;
        Ok((config, result))
    }

    /// Runs the whole sequence, resuming unless `clean` is set.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the first stage failure.
    pub async fn run(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<RunOutput, ReleaseflowError> {
        let (config, result) = self
            .execute(directory, options, RunRequest::full(options))
            .await?;
        Ok(RunOutput::new(&config, result))
    }

    /// Runs a single stage the way its own command does.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn run_stage(
        &self,
        directory: &Path,
        stage: StageId,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        let (_, result) = self
            .execute(directory, options, RunRequest::single(stage, options))
            .await?;
        Ok(result)
    }

    /// Registers the release with the remote service. Starts a new run.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn configure(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.run_stage(directory, StageId::Configure, options).await
    }

    /// Builds the group. Starts a new run from the configured context.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn build(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<RunOutput, ReleaseflowError> {
        let (config, result) = self
            .execute(
                directory,
                options,
                RunRequest::single(StageId::Build, options),
            )
            .await?;
        Ok(RunOutput::new(&config, result))
    }

    /// Generates the artifact repository.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn generate_repository(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.run_stage(directory, StageId::RepositoryGeneration, options)
            .await
    }

    /// Generates one kind of document.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn generate_document(
        &self,
        directory: &Path,
        kind: DocumentKind,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.run_stage(directory, kind.stage(), options).await
    }

    /// Runs the configured add-ons.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn trigger_add_ons(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.run_stage(directory, StageId::AddOns, options).await
    }

    /// Promotes the builds and closes the milestone.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the stage failure.
    pub async fn release(
        &self,
        directory: &Path,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.run_stage(directory, StageId::Release, options).await
    }

    /// Reads the persisted progress of a configuration without running anything.
    ///
    /// # Errors
    ///
    /// Returns the configuration or store error.
    pub async fn status(&self, directory: &Path) -> Result<Option<Progress>, ReleaseflowError> {
        let config = self.load_config(directory)?;
        Ok(self.store_for(&config).load_progress(config.directory()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConfigError, FailureKind};
    use crate::testing::{FakeServices, ReleaseHarness, SAMPLE_FULL_VERSION};
    use pretty_assertions::assert_eq;

    fn facade(harness: &ReleaseHarness) -> CommandFacade {
        CommandFacade::new(harness.services.ports()).with_event_sink(harness.sink.clone())
    }

    #[tokio::test]
    async fn test_run_returns_summary() {
        let harness = ReleaseHarness::new().unwrap();
        let output = facade(&harness)
            .run(harness.config_dir(), &RunOptions::new())
            .await
            .unwrap();

        assert_eq!(output.full_version.as_deref(), Some(SAMPLE_FULL_VERSION));
        assert_eq!(output.release_dir_name.as_deref(), Some("widget-1.0.CR1"));
        assert_eq!(output.build_group.unwrap().len(), 3);
        assert!(output.release_path.unwrap().join("upload-to-candidates.sh").exists());
    }

    #[tokio::test]
    async fn test_status_reads_progress() {
        let harness = ReleaseHarness::new().unwrap();
        let facade = facade(&harness);
        assert!(facade.status(harness.config_dir()).await.unwrap().is_none());

        facade
            .configure(harness.config_dir(), &RunOptions::new())
            .await
            .unwrap();

        let progress = facade.status(harness.config_dir()).await.unwrap().unwrap();
        assert_eq!(progress.completed_stages, vec![StageId::Configure]);
        assert_eq!(progress.next_stage(), Some(StageId::Build));
    }

    #[tokio::test]
    async fn test_other_spellings_of_the_directory_resume() {
        let harness = ReleaseHarness::new().unwrap();
        let facade = facade(&harness);
        let options = RunOptions {
            skip_release: true,
            ..RunOptions::new()
        };
        let dir = harness.config_dir();
        facade.run(dir, &options).await.unwrap();

        let slashed = PathBuf::from(format!("{}/", dir.display()));
        let dotted = dir.join(".");
        let name = dir.file_name().unwrap();
        let parent = dir.join("..").join(name);
        for spelling in [&slashed, &dotted, &parent] {
            let progress = facade.status(spelling).await.unwrap();
            assert!(progress.is_some(), "no progress for {}", spelling.display());
        }

        facade.run(&slashed, &options).await.unwrap();

        let configure_runs = harness
            .sink
            .stages_for("stage.started")
            .into_iter()
            .filter(|stage| stage == "configure")
            .count();
        assert_eq!(configure_runs, 1);
    }

    #[tokio::test]
    async fn test_invalid_configuration_runs_nothing() {
        let harness = ReleaseHarness::with_config("version = \"1.0\"").unwrap();

        let err = facade(&harness)
            .run(harness.config_dir(), &RunOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseflowError::Config(ConfigError::Parse { .. })));
        assert!(!err.is_recoverable());
        assert!(harness.sink.is_empty());
        assert!(harness.services.products.is_empty());
    }

    #[tokio::test]
    async fn test_missing_configuration_directory() {
        let facade = CommandFacade::new(FakeServices::new().ports());
        let dir = tempfile::tempdir().unwrap();

        let err = facade.run(dir.path(), &RunOptions::new()).await.unwrap_err();

        assert!(matches!(err, ReleaseflowError::Config(ConfigError::Missing { .. })));
    }

    #[tokio::test]
    async fn test_document_command_requires_repository() {
        let harness = ReleaseHarness::new().unwrap();
        let facade = facade(&harness);
        facade
            .build(harness.config_dir(), &RunOptions::new())
            .await
            .unwrap_err();
        facade
            .configure(harness.config_dir(), &RunOptions::new())
            .await
            .unwrap();

        let err = facade
            .generate_document(harness.config_dir(), DocumentKind::Licenses, &RunOptions::new())
            .await
            .unwrap_err();

        let failure = err.as_stage_failure().unwrap();
        assert_eq!(failure.stage, StageId::LicensesGeneration);
        assert_eq!(failure.kind, FailureKind::Precondition);
    }
}
