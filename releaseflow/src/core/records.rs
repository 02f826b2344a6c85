//! Records produced by stages and kept in the persisted context.

use super::ArtifactRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Remote identifiers of a component registered by Configure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedComponent {
    /// Build configuration id.
    pub config_id: String,
    /// Owning project id.
    pub project_id: String,
    /// Commit the revision resolved to, when the branch check ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Whether the source moved since it was last recorded.
    #[serde(default)]
    pub modified: bool,
}

/// Remote entities registered or updated by Configure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Product id.
    pub product_id: String,
    /// Product version id.
    pub version_id: String,
    /// Milestone id.
    pub milestone_id: String,
    /// Milestone name, e.g. `CR2`.
    pub milestone_name: String,
    /// Group configuration id.
    pub group_id: String,
    /// Per-component identifiers.
    #[serde(default)]
    pub components: BTreeMap<String, ImportedComponent>,
}

impl ImportResult {
    /// Returns the components whose sources moved since they were recorded.
    pub fn modified_components(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(|(_, c)| c.modified)
            .map(|(name, _)| name.as_str())
    }
}

/// Where the repository content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositorySource {
    /// Fetched from the artifact source for each build.
    Remote,
    /// Read from an externally supplied snapshot.
    Snapshot,
}

/// The generated artifact repository descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryManifest {
    /// Where the manifest was written.
    pub location: PathBuf,
    /// Content origin.
    pub source: RepositorySource,
    /// Whether only the highest version per artifact was kept.
    pub deduplicated: bool,
    /// The repository content.
    pub artifacts: Vec<ArtifactRef>,
}

impl RepositoryManifest {
    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Outcome of one post-processing hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnReport {
    /// Add-on name.
    pub name: String,
    /// Whether it succeeded.
    pub success: bool,
    /// Summary or error message.
    pub message: String,
}

impl AddOnReport {
    /// Creates a success report.
    #[must_use]
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failure report.
    #[must_use]
    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            message: message.into(),
        }
    }
}

/// Final release record; its presence means the pipeline completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutput {
    /// The closed milestone id.
    pub milestone_id: String,
    /// The closed milestone name.
    pub milestone_name: String,
    /// Release directory name, `<abbreviation>-<full version>`.
    pub release_dir_name: String,
    /// Local release directory.
    pub release_path: PathBuf,
    /// Deliverable manifest listing promoted builds.
    pub nvr_list: PathBuf,
    /// Generated upload script.
    pub upload_script: PathBuf,
    /// Number of promoted builds.
    pub promoted: usize,
}
