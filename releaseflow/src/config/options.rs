//! Per-invocation run options.

use crate::core::{RebuildPolicy, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Options of one invocation, mirroring the command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Build temporary (non-promotable) artifacts.
    pub temp_build: bool,
    /// Suffix temporary build versions with a timestamp.
    pub temp_build_timestamp: bool,
    /// Rebuild policy for the Build stage.
    pub rebuild_mode: RebuildPolicy,
    /// Skip repository generation.
    pub skip_repo: bool,
    /// Skip registering entities with the remote service (Configure).
    pub skip_pnc_update: bool,
    /// Skip the Build stage.
    pub skip_builds: bool,
    /// Skip sources generation.
    pub skip_sources: bool,
    /// Skip API documentation generation.
    pub skip_javadoc: bool,
    /// Skip the license report.
    pub skip_licenses: bool,
    /// Skip shared-content analysis.
    pub skip_shared_content: bool,
    /// Stop before the Release stage.
    pub skip_release: bool,
    /// Keep only the highest version of each artifact in the repository.
    pub remove_generated_duplicates: bool,
    /// Bypass the branch-modification check in Configure.
    pub skip_branch_check: bool,
    /// Start from a fresh context instead of resuming.
    pub clean: bool,
    /// Externally supplied repository snapshot.
    pub repo_zip_path: Option<PathBuf>,
    /// Storage URL the generated upload script targets.
    pub release_storage_url: Option<String>,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rebuild policy.
    #[must_use]
    pub fn with_rebuild_mode(mut self, mode: RebuildPolicy) -> Self {
        self.rebuild_mode = mode;
        self
    }

    /// Requests a clean start.
    #[must_use]
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Returns the stages excluded by skip flags.
    #[must_use]
    pub fn skipped_stages(&self) -> BTreeSet<StageId> {
        [
            (self.skip_pnc_update, StageId::Configure),
            (self.skip_builds, StageId::Build),
            (self.skip_repo, StageId::RepositoryGeneration),
            (self.skip_sources, StageId::SourcesGeneration),
            (self.skip_javadoc, StageId::JavadocGeneration),
            (self.skip_licenses, StageId::LicensesGeneration),
            (self.skip_shared_content, StageId::SharedContentAnalysis),
            (self.skip_release, StageId::Release),
        ]
        .into_iter()
        .filter_map(|(skip, stage)| skip.then_some(stage))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_skips_nothing() {
        let options = RunOptions::new();
        assert!(options.skipped_stages().is_empty());
        assert_eq!(options.rebuild_mode, RebuildPolicy::ExplicitDependencyCheck);
    }

    #[test]
    fn test_skip_flags_map_to_stages() {
        let options = RunOptions {
            skip_javadoc: true,
            skip_builds: true,
            ..RunOptions::default()
        };
        let skipped: Vec<StageId> = options.skipped_stages().into_iter().collect();
        assert_eq!(skipped, vec![StageId::Build, StageId::JavadocGeneration]);
    }
}
