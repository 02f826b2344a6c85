//! Summary of a pipeline run.

use crate::context::PersistedContext;
use crate::core::{
    AddOnReport, BuildGroupResult, DocumentArtifact, DocumentKind, ReleaseOutput, StageId,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// What a run produced, read back from the final checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Identifier of the run the context belongs to.
    pub run_id: Uuid,
    /// Resolved product version.
    pub full_version: Option<String>,
    /// Accumulated build outcomes.
    pub build_group_result: Option<BuildGroupResult>,
    /// Where the repository manifest was written.
    pub repository_location: Option<PathBuf>,
    /// Documents produced so far.
    pub documents: BTreeMap<DocumentKind, DocumentArtifact>,
    /// Add-on outcomes.
    pub add_on_reports: Vec<AddOnReport>,
    /// The release record, present once the pipeline completed.
    pub release_output: Option<ReleaseOutput>,
    /// Every stage recorded as completed, across invocations.
    pub completed_stages: Vec<StageId>,
    /// Stages executed by this invocation.
    pub executed: Vec<StageId>,
    /// Stages this invocation skipped.
    pub skipped: Vec<StageId>,
}

impl PipelineResult {
    /// Builds the summary from a checkpointed context.
    #[must_use]
    pub fn from_context(
        context: &PersistedContext,
        executed: Vec<StageId>,
        skipped: Vec<StageId>,
    ) -> Self {
        Self {
            run_id: context.run_id(),
            full_version: context.full_version().map(str::to_string),
            build_group_result: context.build_group_result().cloned(),
            repository_location: context.repository_manifest().map(|m| m.location.clone()),
            documents: context.documents().clone(),
            add_on_reports: context.add_on_reports().to_vec(),
            release_output: context.release_output().cloned(),
            completed_stages: context.completed_stages().to_vec(),
            executed,
            skipped,
        }
    }

    /// Returns true once the release stage completed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release_output.is_some()
    }

    /// Location of a generated document.
    #[must_use]
    pub fn document_location(&self, kind: DocumentKind) -> Option<&PathBuf> {
        self.documents.get(&kind).map(|d| &d.location)
    }
}
