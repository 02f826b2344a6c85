//! Stage runners and their shared execution contract.
//!
//! Each stage of the fixed release sequence is a [`StageRunner`]: it reads the
//! persisted context and returns a [`ContextDelta`] the orchestrator merges and
//! checkpoints. Runners never mutate the context themselves.

mod addons;
mod build;
mod configure;
mod documents;
mod ports;
mod release;
mod repository;

pub use addons::{AddOn, AddOnInvocation, AddOnsStage};
pub use build::BuildStage;
pub use configure::ConfigureStage;
pub use documents::DocumentStage;
pub use ports::StagePorts;
pub use release::{ReleaseStage, UPLOAD_SCRIPT_NAME};
pub use repository::{deduplicate, read_snapshot, RepositoryStage};

use crate::cancellation::CancellationToken;
use crate::config::{ReleaseConfig, RunOptions};
use crate::context::{ContextDelta, PersistedContext};
use crate::core::{BuildGroupResult, ContextField, ImportResult, RebuildPolicy, RepositoryManifest, StageId};
use crate::errors::StageFailure;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Read-only view handed to a runner for one execution.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// The context as of the last checkpoint.
    pub context: &'a PersistedContext,
    /// The loaded release configuration.
    pub config: &'a ReleaseConfig,
    /// Options of this invocation.
    pub options: &'a RunOptions,
    /// Rebuild policy in effect.
    pub policy: RebuildPolicy,
    /// Token interrupting long waits.
    pub cancellation: &'a CancellationToken,
}

impl<'a> StageContext<'a> {
    /// Returns the resolved full version.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `stage` when the field is absent.
    pub fn full_version(&self, stage: StageId) -> Result<&'a str, StageFailure> {
        self.context
            .full_version()
            .ok_or_else(|| StageFailure::precondition(stage, ContextField::FullVersion))
    }

    /// Returns the entities registered by Configure.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `stage` when the field is absent.
    pub fn import_result(&self, stage: StageId) -> Result<&'a ImportResult, StageFailure> {
        self.context
            .import_result()
            .ok_or_else(|| StageFailure::precondition(stage, ContextField::ImportResult))
    }

    /// Returns the accumulated build outcomes.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `stage` when the field is absent.
    pub fn builds(&self, stage: StageId) -> Result<&'a BuildGroupResult, StageFailure> {
        self.context
            .build_group_result()
            .ok_or_else(|| StageFailure::precondition(stage, ContextField::BuildGroupResult))
    }

    /// Returns the repository manifest.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `stage` when the field is absent.
    pub fn manifest(&self, stage: StageId) -> Result<&'a RepositoryManifest, StageFailure> {
        self.context
            .repository_manifest()
            .ok_or_else(|| StageFailure::precondition(stage, ContextField::RepositoryManifest))
    }
}

/// A unit of the release sequence.
#[async_trait]
pub trait StageRunner: Send + Sync + Debug {
    /// The stage this runner implements.
    fn stage(&self) -> StageId;

    /// Executes the stage against the current context.
    ///
    /// # Errors
    ///
    /// Returns a `StageFailure` naming the stage and cause. Results obtained
    /// before failing may be attached with `StageFailure::with_partial`.
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure>;
}

/// Builds the runner of every stage from one set of ports.
#[must_use]
pub fn standard_runners(ports: &StagePorts) -> Vec<Arc<dyn StageRunner>> {
    let mut runners: Vec<Arc<dyn StageRunner>> = vec![
        Arc::new(ConfigureStage::new(
            ports.registries.clone(),
            Arc::clone(&ports.inspector),
        )),
        Arc::new(BuildStage::new(Arc::clone(&ports.builds))),
        Arc::new(RepositoryStage::new(Arc::clone(&ports.artifacts))),
    ];
    for kind in crate::core::DocumentKind::ALL {
        runners.push(Arc::new(DocumentStage::new(kind, ports.documents.get(kind))));
    }
    runners.push(Arc::new(AddOnsStage::new(ports.add_ons.clone())));
    runners.push(Arc::new(ReleaseStage::new(Arc::clone(&ports.releases))));
    runners
}
