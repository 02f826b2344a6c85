//! Remote build outcomes recorded per component.

use super::ArtifactRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one component in a group build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Built successfully in this run.
    Success,
    /// Not rebuilt; a previous successful build is reused.
    Reused,
    /// The build failed.
    Failed,
}

impl BuildStatus {
    /// Returns true if the build's artifacts can be used downstream.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Success | Self::Reused)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Reused => write!(f, "reused"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A component's build as reported by the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBuild {
    /// Component name.
    pub component: String,
    /// Remote build id.
    pub build_id: String,
    /// Build outcome.
    pub status: BuildStatus,
    /// Artifacts the build produced.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    /// Digest of the dependency set the build was made against.
    pub dependency_digest: String,
    /// Whether this was a temporary build.
    #[serde(default)]
    pub temporary: bool,
    /// When the build finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ComponentBuild {
    /// Creates a successful build record.
    #[must_use]
    pub fn success(
        component: impl Into<String>,
        build_id: impl Into<String>,
        dependency_digest: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            build_id: build_id.into(),
            status: BuildStatus::Success,
            artifacts: Vec::new(),
            dependency_digest: dependency_digest.into(),
            temporary: false,
            finished_at: Some(Utc::now()),
        }
    }

    /// Sets the produced artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Marks the build as temporary.
    #[must_use]
    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Returns a copy marked as reused by this run.
    #[must_use]
    pub fn reused(mut self) -> Self {
        self.status = BuildStatus::Reused;
        self
    }
}

/// Accumulated build outcomes of the group, keyed by component.
///
/// Entries are never dropped: recording a different build for a component
/// moves the previous entry to `superseded`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildGroupResult {
    /// The build group name.
    pub group: String,
    /// Current build per component.
    #[serde(default)]
    pub builds: BTreeMap<String, ComponentBuild>,
    /// Builds replaced by later ones, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<ComponentBuild>,
}

impl BuildGroupResult {
    /// Creates an empty result for a group.
    #[must_use]
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            builds: BTreeMap::new(),
            superseded: Vec::new(),
        }
    }

    /// Records a build. Recording the same build id again is a no-op.
    pub fn record(&mut self, build: ComponentBuild) {
        match self.builds.get(&build.component) {
            Some(existing) if existing.build_id == build.build_id => {}
            Some(_) => {
                if let Some(previous) = self.builds.insert(build.component.clone(), build) {
                    self.superseded.push(previous);
                }
            }
            None => {
                self.builds.insert(build.component.clone(), build);
            }
        }
    }

    /// Returns the build recorded for a component.
    #[must_use]
    pub fn get(&self, component: &str) -> Option<&ComponentBuild> {
        self.builds.get(component)
    }

    /// Iterates over builds whose artifacts are usable.
    pub fn usable(&self) -> impl Iterator<Item = &ComponentBuild> {
        self.builds.values().filter(|b| b.status.is_usable())
    }

    /// Returns true if any current build is temporary.
    #[must_use]
    pub fn has_temporary_builds(&self) -> bool {
        self.builds.values().any(|b| b.temporary)
    }

    /// Number of components with a recorded build.
    #[must_use]
    pub fn len(&self) -> usize {
        self.builds.len()
    }

    /// Returns true if no builds are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_new_components() {
        let mut result = BuildGroupResult::new("group");
        result.record(ComponentBuild::success("a", "1", "d"));
        result.record(ComponentBuild::success("b", "2", "d"));

        assert_eq!(result.len(), 2);
        assert!(result.superseded.is_empty());
    }

    #[test]
    fn test_record_same_build_is_noop() {
        let mut result = BuildGroupResult::new("group");
        result.record(ComponentBuild::success("a", "1", "d"));
        result.record(ComponentBuild::success("a", "1", "d").reused());

        assert_eq!(result.get("a").unwrap().status, BuildStatus::Success);
        assert!(result.superseded.is_empty());
    }

    #[test]
    fn test_record_newer_build_supersedes() {
        let mut result = BuildGroupResult::new("group");
        result.record(ComponentBuild::success("a", "1", "d"));
        result.record(ComponentBuild::success("a", "7", "d"));

        assert_eq!(result.get("a").unwrap().build_id, "7");
        assert_eq!(result.superseded.len(), 1);
        assert_eq!(result.superseded[0].build_id, "1");
    }

    #[test]
    fn test_usable_and_temporary() {
        let mut result = BuildGroupResult::new("group");
        result.record(ComponentBuild::success("a", "1", "d").temporary(true));
        assert!(result.has_temporary_builds());
        assert_eq!(result.usable().count(), 1);
    }
}
