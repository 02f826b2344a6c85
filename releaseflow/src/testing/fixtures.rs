//! Sample configuration, prepared contexts and an end-to-end harness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::FakeServices;
use crate::cancellation::CancellationToken;
use crate::config::{ReleaseConfig, RunOptions, CONFIG_FILE_NAME};
use crate::context::{ContextDelta, PersistedContext};
use crate::core::{
    ArtifactCoordinate, ArtifactRef, ComponentBuild, ImportResult, ImportedComponent, StageId,
};
use crate::errors::{ConfigError, ReleaseflowError};
use crate::events::CollectingEventSink;
use crate::pipeline::{PipelineOrchestrator, PipelineResult, RunRequest};
use crate::store::{ContextStore, FsContextStore};

/// A three-component release: `web` depends on `api`, which depends on `core`.
pub const SAMPLE_CONFIG: &str = r#"
version = "1.0"
milestone = "CR1"
group = "widget-1.0-all"

[product]
name = "Widget"
abbreviation = "widget"
description = "Sample product"

[[components]]
name = "core"
project = "widget/core"
scm_url = "https://git.example.com/widget/core.git"
revision = "main"
build_script = "mvn clean deploy"

[[components]]
name = "api"
project = "widget/api"
scm_url = "https://git.example.com/widget/api.git"
revision = "main"
build_script = "mvn clean deploy"
dependencies = ["core"]

[[components]]
name = "web"
project = "widget/web"
scm_url = "https://git.example.com/widget/web.git"
revision = "main"
build_script = "mvn clean deploy"
dependencies = ["api"]

[addons.notes]
format = "markdown"

[flow]
poll_interval_ms = 0
"#;

/// Group name of [`SAMPLE_CONFIG`].
pub const SAMPLE_GROUP: &str = "widget-1.0-all";

/// Full version [`SAMPLE_CONFIG`] resolves to.
pub const SAMPLE_FULL_VERSION: &str = "1.0.CR1";

/// Parses [`SAMPLE_CONFIG`] bound to `directory`.
///
/// # Errors
///
/// Returns the validation error if the sample no longer validates.
pub fn sample_config(directory: impl Into<PathBuf>) -> Result<ReleaseConfig, ConfigError> {
    ReleaseConfig::from_toml_str(SAMPLE_CONFIG, directory)
}

/// The jar a fake build of `component` produces.
#[must_use]
pub fn sample_artifact(component: &str) -> ArtifactRef {
    let coordinate = ArtifactCoordinate::new("org.example", component, "1.0.0.redhat-00001", "jar");
    let location = format!("https://repo.example.com/{}", coordinate.repository_path());
    ArtifactRef::new(coordinate, location)
}

fn sample_import(config: &ReleaseConfig) -> ImportResult {
    ImportResult {
        product_id: "products-1".to_string(),
        version_id: "product-versions-1".to_string(),
        milestone_id: "product-milestones-1".to_string(),
        milestone_name: config.milestone.clone(),
        group_id: "group-configs-1".to_string(),
        components: config
            .components
            .iter()
            .map(|c| {
                let imported = ImportedComponent {
                    config_id: format!("build-configs-{}", c.name),
                    project_id: format!("projects-{}", c.name),
                    commit: None,
                    modified: false,
                };
                (c.name.clone(), imported)
            })
            .collect(),
    }
}

/// Outputs of a successful Configure for `config`.
#[must_use]
pub fn configure_delta(config: &ReleaseConfig) -> ContextDelta {
    ContextDelta::new()
        .with_full_version(format!("{}.{}", config.version, config.milestone))
        .with_import_result(sample_import(config))
}

/// Outputs of a successful Build of every component of `config`.
#[must_use]
pub fn build_delta(config: &ReleaseConfig) -> ContextDelta {
    let builds = config
        .build_order()
        .into_iter()
        .map(|c| {
            ComponentBuild::success(&c.name, format!("{}-b1", c.name), c.dependency_digest())
                .with_artifacts(vec![sample_artifact(&c.name)])
        })
        .collect();
    ContextDelta::new().with_builds(&config.group, builds)
}

fn context_with(config: &ReleaseConfig, steps: Vec<(StageId, ContextDelta)>) -> PersistedContext {
    let mut context = PersistedContext::new(config.directory(), config.signature());
    for (stage, delta) in steps {
        if let Err(err) = context.apply(delta) {
            panic!("fixture delta for {stage} conflicts: {err}");
        }
        context.mark_completed(stage);
    }
    context
}

/// A context where Configure completed.
#[must_use]
pub fn configured_context(config: &ReleaseConfig) -> PersistedContext {
    context_with(config, vec![(StageId::Configure, configure_delta(config))])
}

/// A context where Configure and Build completed.
#[must_use]
pub fn built_context(config: &ReleaseConfig) -> PersistedContext {
    context_with(
        config,
        vec![
            (StageId::Configure, configure_delta(config)),
            (StageId::Build, build_delta(config)),
        ],
    )
}

/// A configuration directory in a temp dir, wired to [`FakeServices`].
///
/// Contexts are persisted with the filesystem store, so successive
/// invocations behave like separate command-line runs.
#[derive(Debug)]
pub struct ReleaseHarness {
    dir: TempDir,
    /// The fakes behind every stage.
    pub services: FakeServices,
    /// Collected pipeline events.
    pub sink: Arc<CollectingEventSink>,
    /// Token handed to every orchestrator.
    pub cancellation: CancellationToken,
}

impl ReleaseHarness {
    /// Creates a harness with [`SAMPLE_CONFIG`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp dir cannot be prepared.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(SAMPLE_CONFIG)
    }

    /// Creates a harness with the given `release.toml` content.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp dir cannot be prepared.
    pub fn with_config(content: &str) -> std::io::Result<Self> {
        let harness = Self {
            dir: tempfile::tempdir()?,
            services: FakeServices::new(),
            sink: Arc::new(CollectingEventSink::new()),
            cancellation: CancellationToken::new(),
        };
        harness.write_config(content)?;
        Ok(harness)
    }

    /// The configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Replaces `release.toml`.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub fn write_config(&self, content: &str) -> std::io::Result<()> {
        std::fs::write(self.dir.path().join(CONFIG_FILE_NAME), content)
    }

    /// Loads the current configuration.
    ///
    /// # Errors
    ///
    /// Returns the configuration error.
    pub fn config(&self) -> Result<ReleaseConfig, ConfigError> {
        ReleaseConfig::load(self.dir.path())
    }

    /// The store the configuration's contexts live in.
    ///
    /// # Errors
    ///
    /// Returns the configuration error.
    pub fn store(&self) -> Result<Arc<FsContextStore>, ConfigError> {
        Ok(Arc::new(FsContextStore::in_target_dir(self.config()?.target_dir())))
    }

    /// An orchestrator with the standard runners over the fakes.
    ///
    /// # Errors
    ///
    /// Returns the configuration error.
    pub fn orchestrator(&self) -> Result<PipelineOrchestrator, ConfigError> {
        Ok(PipelineOrchestrator::with_ports(self.store()?, &self.services.ports())
            .with_event_sink(self.sink.clone())
            .with_cancellation(self.cancellation.clone()))
    }

    /// Runs the whole sequence.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error.
    pub async fn run(&self, options: &RunOptions) -> Result<PipelineResult, ReleaseflowError> {
        self.execute(&RunRequest::full(options), options).await
    }

    /// Runs one stage as its own command would.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error.
    pub async fn run_stage(
        &self,
        stage: StageId,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        self.execute(&RunRequest::single(stage, options), options).await
    }

    async fn execute(
        &self,
        request: &RunRequest,
        options: &RunOptions,
    ) -> Result<PipelineResult, ReleaseflowError> {
        let config = self.config()?;
        self.orchestrator()?.run(&config, options, request).await
    }

    /// The persisted context, if any.
    ///
    /// # Errors
    ///
    /// Returns the configuration or store error.
    pub async fn context(&self) -> Result<Option<PersistedContext>, ReleaseflowError> {
        let config = self.config()?;
        Ok(self.store()?.load(config.directory()).await?)
    }
}
