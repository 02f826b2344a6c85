//! Artifact repository content source.

use super::RemoteError;
use crate::core::{ArtifactRef, ComponentBuild};
use async_trait::async_trait;

/// Supplies the repository content of a build.
///
/// The content includes the build's own artifacts plus whatever the
/// repository must carry to be self-contained (imported dependencies).
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Returns the artifacts belonging in the repository for one build.
    async fn repository_artifacts(
        &self,
        build: &ComponentBuild,
    ) -> Result<Vec<ArtifactRef>, RemoteError>;
}
