//! Context updates returned by stage runners.

use crate::core::{
    AddOnReport, ComponentBuild, DocumentArtifact, ImportResult, ReleaseOutput,
    RepositoryManifest,
};
use serde::{Deserialize, Serialize};

/// Build results reported by one Build stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDelta {
    /// The build group the results belong to.
    pub group: String,
    /// Component builds to record.
    pub builds: Vec<ComponentBuild>,
}

/// The set of updates a stage asks the orchestrator to merge.
///
/// Stages never mutate the persisted context directly; they return a delta
/// and the orchestrator merges it with [`PersistedContext::apply`].
///
/// [`PersistedContext::apply`]: super::PersistedContext::apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDelta {
    /// Resolved product version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_version: Option<String>,
    /// Remote entities registered by Configure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_result: Option<ImportResult>,
    /// Component build outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builds: Option<BuildDelta>,
    /// Generated repository descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_manifest: Option<RepositoryManifest>,
    /// Generated documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentArtifact>,
    /// Add-on outcomes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_on_reports: Vec<AddOnReport>,
    /// Final release record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_output: Option<ReleaseOutput>,
}

impl ContextDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full version.
    #[must_use]
    pub fn with_full_version(mut self, version: impl Into<String>) -> Self {
        self.full_version = Some(version.into());
        self
    }

    /// Sets the import result.
    #[must_use]
    pub fn with_import_result(mut self, result: ImportResult) -> Self {
        self.import_result = Some(result);
        self
    }

    /// Sets the build results of a group.
    #[must_use]
    pub fn with_builds(mut self, group: impl Into<String>, builds: Vec<ComponentBuild>) -> Self {
        self.builds = Some(BuildDelta {
            group: group.into(),
            builds,
        });
        self
    }

    /// Sets the repository manifest.
    #[must_use]
    pub fn with_repository_manifest(mut self, manifest: RepositoryManifest) -> Self {
        self.repository_manifest = Some(manifest);
        self
    }

    /// Adds a generated document.
    #[must_use]
    pub fn with_document(mut self, document: DocumentArtifact) -> Self {
        self.documents.push(document);
        self
    }

    /// Sets the add-on reports.
    #[must_use]
    pub fn with_add_on_reports(mut self, reports: Vec<AddOnReport>) -> Self {
        self.add_on_reports = reports;
        self
    }

    /// Sets the release output.
    #[must_use]
    pub fn with_release_output(mut self, output: ReleaseOutput) -> Self {
        self.release_output = Some(output);
        self
    }

    /// Returns true if the delta carries no updates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_version.is_none()
            && self.import_result.is_none()
            && self.builds.as_ref().map_or(true, |b| b.builds.is_empty())
            && self.repository_manifest.is_none()
            && self.documents.is_empty()
            && self.add_on_reports.is_empty()
            && self.release_output.is_none()
    }
}
