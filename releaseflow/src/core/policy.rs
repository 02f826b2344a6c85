//! Rebuild policies and the component selection they imply.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Strategy deciding which components of the group are rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildPolicy {
    /// Rebuild components whose declared dependencies or sources changed.
    #[default]
    ExplicitDependencyCheck,
    /// Additionally rebuild everything depending on a rebuilt component.
    ImplicitDependencyCheck,
    /// Rebuild every component unconditionally.
    Force,
}

impl RebuildPolicy {
    /// All policies, in option-help order.
    pub const ALL: [Self; 3] = [
        Self::ExplicitDependencyCheck,
        Self::ImplicitDependencyCheck,
        Self::Force,
    ];

    /// Returns the option value naming this policy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitDependencyCheck => "EXPLICIT_DEPENDENCY_CHECK",
            Self::ImplicitDependencyCheck => "IMPLICIT_DEPENDENCY_CHECK",
            Self::Force => "FORCE",
        }
    }

    /// Returns false for `Force`, which discards incremental results.
    #[must_use]
    pub fn is_incremental(self) -> bool {
        !matches!(self, Self::Force)
    }

    /// Selects the components to submit for building.
    #[must_use]
    pub fn select(self, candidates: &[RebuildCandidate]) -> BTreeSet<String> {
        match self {
            Self::Force => candidates.iter().map(|c| c.name.clone()).collect(),
            Self::ExplicitDependencyCheck => explicit_selection(candidates),
            Self::ImplicitDependencyCheck => {
                let mut selected = explicit_selection(candidates);
                let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
                for candidate in candidates {
                    for dep in &candidate.dependencies {
                        dependents.entry(dep.as_str()).or_default().push(&candidate.name);
                    }
                }

                let mut queue: Vec<String> = selected.iter().cloned().collect();
                while let Some(name) = queue.pop() {
                    for dependent in dependents.get(name.as_str()).into_iter().flatten() {
                        if selected.insert((*dependent).to_string()) {
                            queue.push((*dependent).to_string());
                        }
                    }
                }
                selected
            }
        }
    }
}

fn explicit_selection(candidates: &[RebuildCandidate]) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|c| c.needs_rebuild())
        .map(|c| c.name.clone())
        .collect()
}

impl fmt::Display for RebuildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebuildPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidOption {
                option: "mode".to_string(),
                value: s.to_string(),
                expected: Self::ALL.iter().map(|p| p.as_str().to_string()).collect(),
            })
    }
}

/// What the Build stage knows about a component when choosing what to rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildCandidate {
    /// Component name.
    pub name: String,
    /// Names of in-group components it depends on.
    pub dependencies: Vec<String>,
    /// Digest of the declared dependency set.
    pub dependency_digest: String,
    /// Digest recorded with the last successful build, if any.
    pub previous_digest: Option<String>,
    /// Whether the last successful build was temporary.
    pub previous_temporary: bool,
    /// Whether this run asks for temporary builds.
    pub temporary: bool,
    /// Whether Configure saw new source revisions.
    pub source_modified: bool,
}

impl RebuildCandidate {
    /// Returns true if the explicit dependency check requires a rebuild.
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        match &self.previous_digest {
            None => true,
            Some(previous) => {
                previous != &self.dependency_digest
                    || self.source_modified
                    || (self.previous_temporary && !self.temporary)
            }
        }
    }
}
