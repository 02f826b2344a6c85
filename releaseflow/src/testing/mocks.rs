//! Scriptable stage runners.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;

use super::fixtures::{sample_artifact, SAMPLE_FULL_VERSION, SAMPLE_GROUP};
use crate::context::ContextDelta;
use crate::core::{
    AddOnReport, ComponentBuild, DocumentArtifact, DocumentKind, ImportResult, ReleaseOutput,
    RepositoryManifest, RepositorySource, StageId,
};
use crate::errors::{FailureKind, StageFailure};
use crate::stages::{StageContext, StageRunner};

/// A runner that counts calls and returns a configurable result.
///
/// By default it returns a plausible delta for its stage, so a full
/// sequence of mock runners satisfies every stage's preconditions.
#[derive(Debug)]
pub struct MockRunner {
    stage: StageId,
    response: Mutex<Result<ContextDelta, StageFailure>>,
    call_count: Mutex<usize>,
}

impl MockRunner {
    /// Creates a runner returning the default delta of `stage`.
    #[must_use]
    pub fn producing(stage: StageId) -> Self {
        Self {
            stage,
            response: Mutex::new(Ok(default_delta(stage))),
            call_count: Mutex::new(0),
        }
    }

    /// Creates a runner returning an empty delta.
    #[must_use]
    pub fn empty(stage: StageId) -> Self {
        let runner = Self::producing(stage);
        runner.respond_with(ContextDelta::new());
        runner
    }

    /// Sets the delta to return.
    pub fn respond_with(&self, delta: ContextDelta) {
        *self.response.lock() = Ok(delta);
    }

    /// Restores the default delta.
    pub fn succeed(&self) {
        self.respond_with(default_delta(self.stage));
    }

    /// Makes every later call fail.
    pub fn fail_with(&self, kind: FailureKind, message: impl Into<String>) {
        *self.response.lock() = Err(StageFailure::new(self.stage, kind, message));
    }

    /// Makes every later call fail with a prepared failure.
    pub fn fail_with_partial(&self, failure: StageFailure) {
        *self.response.lock() = Err(failure);
    }

    /// Returns the number of times the runner was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl StageRunner for MockRunner {
    fn stage(&self) -> StageId {
        self.stage
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        *self.call_count.lock() += 1;
        self.response.lock().clone()
    }
}

fn default_delta(stage: StageId) -> ContextDelta {
    let delta = ContextDelta::new();
    match stage {
        StageId::Configure => delta
            .with_full_version(SAMPLE_FULL_VERSION)
            .with_import_result(ImportResult {
                product_id: "products-1".to_string(),
                version_id: "product-versions-1".to_string(),
                milestone_id: "product-milestones-1".to_string(),
                milestone_name: "CR1".to_string(),
                group_id: "group-configs-1".to_string(),
                components: std::collections::BTreeMap::new(),
            }),
        StageId::Build => delta.with_builds(
            SAMPLE_GROUP,
            vec![ComponentBuild::success("core", "core-b1", "digest")
                .with_artifacts(vec![sample_artifact("core")])],
        ),
        StageId::RepositoryGeneration => delta.with_repository_manifest(RepositoryManifest {
            location: PathBuf::from("widget-1.0.CR1-maven-repository.json"),
            source: RepositorySource::Remote,
            deduplicated: false,
            artifacts: vec![sample_artifact("core")],
        }),
        StageId::AddOns => delta.with_add_on_reports(vec![AddOnReport::success("notes", "ok")]),
        StageId::Release => delta.with_release_output(ReleaseOutput {
            milestone_id: "product-milestones-1".to_string(),
            milestone_name: "CR1".to_string(),
            release_dir_name: "widget-1.0.CR1".to_string(),
            release_path: PathBuf::from("widget-1.0.CR1"),
            nvr_list: PathBuf::from("widget-1.0.CR1/widget-1.0.CR1-nvr-list.txt"),
            upload_script: PathBuf::from("widget-1.0.CR1/upload-to-candidates.sh"),
            promoted: 1,
        }),
        other => match DocumentKind::for_stage(other) {
            Some(kind) => delta.with_document(DocumentArtifact::new(
                kind,
                format!("widget-1.0.CR1-{kind}.json"),
                1,
            )),
            None => delta,
        },
    }
}
