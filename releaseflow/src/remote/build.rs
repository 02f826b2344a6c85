//! Build-trigger service contract.

use super::RemoteError;
use crate::cancellation::CancellationToken;
use crate::core::{ArtifactRef, ComponentBuild, RebuildPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// One component submitted with a group build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSubmission {
    /// Component name.
    pub component: String,
    /// Build configuration id.
    pub config_id: String,
    /// Digest of the component's dependency set.
    pub dependency_digest: String,
}

/// A group build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuildRequest {
    /// Group configuration id.
    pub group_config_id: String,
    /// Components to build.
    pub components: Vec<BuildSubmission>,
    /// The rebuild predicate the service applies on its side.
    pub policy: RebuildPolicy,
    /// Build temporary (non-promotable) artifacts.
    pub temporary: bool,
    /// Suffix temporary versions with a timestamp.
    pub temporary_timestamp: bool,
}

/// Handle to a submitted group build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuildHandle {
    /// Remote group build id.
    pub id: String,
}

/// Whether a group build is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBuildState {
    /// Some components are still building.
    Running,
    /// Every component reached a terminal state.
    Finished,
}

/// Terminal outcome of one submitted component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComponentOutcome {
    /// Built successfully.
    Success {
        /// Remote build id.
        build_id: String,
        /// Produced artifacts.
        artifacts: Vec<ArtifactRef>,
    },
    /// The service decided an existing build is still valid.
    NoRebuildRequired {
        /// The reused build id.
        build_id: String,
        /// Its artifacts.
        artifacts: Vec<ArtifactRef>,
    },
    /// The build failed.
    Failed {
        /// Remote build id, when one was assigned.
        build_id: Option<String>,
        /// Failure reason.
        message: String,
    },
}

/// Group build state with per-component outcomes known so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuildStatus {
    /// Overall state.
    pub state: GroupBuildState,
    /// Outcome per component name.
    #[serde(default)]
    pub components: BTreeMap<String, ComponentOutcome>,
}

impl GroupBuildStatus {
    /// Returns true once the group reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state == GroupBuildState::Finished
    }
}

/// Contract of the remote build-trigger service.
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Returns the latest successful build of a component, if any.
    async fn latest_build(
        &self,
        component: &str,
        config_id: &str,
    ) -> Result<Option<ComponentBuild>, RemoteError>;

    /// Submits a group build.
    async fn submit_group_build(
        &self,
        request: &GroupBuildRequest,
    ) -> Result<GroupBuildHandle, RemoteError>;

    /// Returns the current state of a group build.
    async fn status(&self, handle: &GroupBuildHandle) -> Result<GroupBuildStatus, RemoteError>;
}

/// Polls a group build until it is terminal or the token is cancelled.
///
/// # Errors
///
/// Returns `RemoteError::Cancelled` on cancellation, or the first error
/// reported by `status`.
pub async fn await_completion(
    trigger: &dyn BuildTrigger,
    handle: &GroupBuildHandle,
    poll_interval: Duration,
    cancellation: &CancellationToken,
) -> Result<GroupBuildStatus, RemoteError> {
    loop {
        let status = tokio::select! {
            () = cancellation.cancelled() => return Err(RemoteError::Cancelled),
            status = trigger.status(handle) => status?,
        };
        if status.is_terminal() {
            return Ok(status);
        }
        debug!(
            handle = %handle.id,
            finished = status.components.len(),
            "Group build still running"
        );

        tokio::select! {
            () = cancellation.cancelled() => return Err(RemoteError::Cancelled),
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}
