//! The durable record of pipeline progress.

use super::ContextDelta;
use crate::core::{
    AddOnReport, BuildGroupResult, ContextField, DocumentArtifact, DocumentKind, ImportResult,
    ReleaseOutput, RepositoryManifest, StageId,
};
use crate::errors::ContextConflictError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Persisted state of one release run.
///
/// The context is only mutated through [`apply`](Self::apply),
/// [`mark_completed`](Self::mark_completed) and the explicit reset paths, so
/// every checkpoint is a fold of stage deltas over the initial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedContext {
    schema_version: u32,
    revision: u64,
    run_id: Uuid,
    signature: String,
    config_directory: PathBuf,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    full_version: Option<String>,
    #[serde(default)]
    import_result: Option<ImportResult>,
    #[serde(default)]
    build_group_result: Option<BuildGroupResult>,
    #[serde(default)]
    repository_manifest: Option<RepositoryManifest>,
    #[serde(default)]
    documents: BTreeMap<DocumentKind, DocumentArtifact>,
    #[serde(default)]
    add_on_reports: Vec<AddOnReport>,
    #[serde(default)]
    release_output: Option<ReleaseOutput>,
    #[serde(default)]
    completed_stages: Vec<StageId>,
}

impl PersistedContext {
    /// Creates a fresh context bound to a configuration directory.
    #[must_use]
    pub fn new(config_directory: impl Into<PathBuf>, signature: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            revision: 0,
            run_id: Uuid::new_v4(),
            signature: signature.into(),
            config_directory: config_directory.into(),
            started_at: now,
            updated_at: now,
            full_version: None,
            import_result: None,
            build_group_result: None,
            repository_manifest: None,
            documents: BTreeMap::new(),
            add_on_reports: Vec::new(),
            release_output: None,
            completed_stages: Vec::new(),
        }
    }

    /// Schema version of the record.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Number of checkpoints written.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Identifier of the run that created this context.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Signature of the configuration the run was started with.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The configuration directory this context belongs to.
    #[must_use]
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the context last changed.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The resolved product version.
    #[must_use]
    pub fn full_version(&self) -> Option<&str> {
        self.full_version.as_deref()
    }

    /// The entities registered by Configure.
    #[must_use]
    pub fn import_result(&self) -> Option<&ImportResult> {
        self.import_result.as_ref()
    }

    /// The accumulated build outcomes.
    #[must_use]
    pub fn build_group_result(&self) -> Option<&BuildGroupResult> {
        self.build_group_result.as_ref()
    }

    /// The generated repository descriptor.
    #[must_use]
    pub fn repository_manifest(&self) -> Option<&RepositoryManifest> {
        self.repository_manifest.as_ref()
    }

    /// The generated documents.
    #[must_use]
    pub fn documents(&self) -> &BTreeMap<DocumentKind, DocumentArtifact> {
        &self.documents
    }

    /// Returns the document of a kind, if generated.
    #[must_use]
    pub fn document(&self, kind: DocumentKind) -> Option<&DocumentArtifact> {
        self.documents.get(&kind)
    }

    /// Add-on outcomes.
    #[must_use]
    pub fn add_on_reports(&self) -> &[AddOnReport] {
        &self.add_on_reports
    }

    /// The release record.
    #[must_use]
    pub fn release_output(&self) -> Option<&ReleaseOutput> {
        self.release_output.as_ref()
    }

    /// Stages completed so far, in execution order.
    #[must_use]
    pub fn completed_stages(&self) -> &[StageId] {
        &self.completed_stages
    }

    /// Returns true if the stage completed in this run.
    #[must_use]
    pub fn is_completed(&self, stage: StageId) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Returns true if the release stage recorded its output.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release_output.is_some()
    }

    /// Returns true if a required field is present.
    #[must_use]
    pub fn has(&self, field: ContextField) -> bool {
        match field {
            ContextField::FullVersion => self.full_version.is_some(),
            ContextField::ImportResult => self.import_result.is_some(),
            ContextField::BuildGroupResult => self.build_group_result.is_some(),
            ContextField::RepositoryManifest => self.repository_manifest.is_some(),
        }
    }

    /// Merges a stage delta.
    ///
    /// The merge is all-or-nothing: conflicts are detected before anything
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns `ContextConflictError` if a set-once field would change or the
    /// builds belong to a different group.
    pub fn apply(&mut self, delta: ContextDelta) -> Result<(), ContextConflictError> {
        check_set_once("full_version", self.full_version.as_ref(), delta.full_version.as_ref(), |v| v.clone())?;
        check_set_once(
            "repository_manifest",
            self.repository_manifest.as_ref(),
            delta.repository_manifest.as_ref(),
            |m| m.location.display().to_string(),
        )?;
        check_set_once(
            "release_output",
            self.release_output.as_ref(),
            delta.release_output.as_ref(),
            |r| r.milestone_name.clone(),
        )?;
        if let (Some(existing), Some(incoming)) = (&self.build_group_result, &delta.builds) {
            if existing.group != incoming.group {
                return Err(ContextConflictError::new(
                    "build_group_result.group",
                    existing.group.clone(),
                    incoming.group.clone(),
                ));
            }
        }

        if delta.full_version.is_some() {
            self.full_version = delta.full_version;
        }
        if delta.import_result.is_some() {
            self.import_result = delta.import_result;
        }
        if let Some(builds) = delta.builds {
            let result = self
                .build_group_result
                .get_or_insert_with(|| BuildGroupResult::new(builds.group.clone()));
            for build in builds.builds {
                result.record(build);
            }
        }
        if delta.repository_manifest.is_some() {
            self.repository_manifest = delta.repository_manifest;
        }
        for document in delta.documents {
            self.documents.insert(document.kind, document);
        }
        for report in delta.add_on_reports {
            match self.add_on_reports.iter_mut().find(|r| r.name == report.name) {
                Some(existing) => *existing = report,
                None => self.add_on_reports.push(report),
            }
        }
        if delta.release_output.is_some() {
            self.release_output = delta.release_output;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a stage as completed.
    pub fn mark_completed(&mut self, stage: StageId) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        self.updated_at = Utc::now();
    }

    /// Bumps the revision before a checkpoint is written.
    pub fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.updated_at = Utc::now();
        self.revision
    }

    /// Drops the stage and every later one together with their outputs.
    ///
    /// Used when a starting-point stage begins a new run over an existing
    /// context. Resetting from `Configure` leaves a fresh context with a new
    /// run id.
    pub fn reset_from(&mut self, stage: StageId) {
        if stage == StageId::Configure {
            let revision = self.revision;
            *self = Self::new(self.config_directory.clone(), self.signature.clone());
            self.revision = revision;
            return;
        }
        self.completed_stages.retain(|s| *s < stage);
        for later in StageId::ALL.into_iter().filter(|s| *s >= stage) {
            self.drop_outputs(later);
        }
        self.updated_at = Utc::now();
    }

    /// Clears the replaceable outputs of a stage about to be re-run.
    ///
    /// Build results are append-only and survive; the re-run supersedes them.
    pub fn clear_outputs_of(&mut self, stage: StageId) {
        if stage != StageId::Build {
            self.drop_outputs(stage);
        }
    }

    /// Rebinds the context to a new configuration signature.
    pub fn set_signature(&mut self, signature: impl Into<String>) {
        self.signature = signature.into();
    }

    fn drop_outputs(&mut self, stage: StageId) {
        match stage {
            StageId::Configure => {
                self.full_version = None;
                self.import_result = None;
            }
            StageId::Build => self.build_group_result = None,
            StageId::RepositoryGeneration => self.repository_manifest = None,
            StageId::AddOns => self.add_on_reports.clear(),
            StageId::Release => self.release_output = None,
            other => {
                if let Some(kind) = DocumentKind::for_stage(other) {
                    self.documents.remove(&kind);
                }
            }
        }
    }

    /// Returns the lightweight progress view of this context.
    #[must_use]
    pub fn progress(&self) -> Progress {
        Progress {
            schema_version: self.schema_version,
            revision: self.revision,
            run_id: self.run_id,
            signature: self.signature.clone(),
            config_directory: self.config_directory.clone(),
            full_version: self.full_version.clone(),
            completed_stages: self.completed_stages.clone(),
            released: self.release_output.is_some(),
            updated_at: self.updated_at,
        }
    }
}

fn check_set_once<T: PartialEq>(
    field: &str,
    existing: Option<&T>,
    incoming: Option<&T>,
    render: impl Fn(&T) -> String,
) -> Result<(), ContextConflictError> {
    match (existing, incoming) {
        (Some(current), Some(next)) if current != next => Err(ContextConflictError::new(
            field,
            render(current),
            render(next),
        )),
        _ => Ok(()),
    }
}

/// Small index of a persisted context, readable without the full payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Schema version of the record.
    pub schema_version: u32,
    /// Checkpoint revision.
    pub revision: u64,
    /// Run identifier.
    pub run_id: Uuid,
    /// Configuration signature.
    pub signature: String,
    /// Configuration directory.
    pub config_directory: PathBuf,
    /// Resolved product version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_version: Option<String>,
    /// Completed stages in order.
    pub completed_stages: Vec<StageId>,
    /// Whether the release stage completed.
    #[serde(default)]
    pub released: bool,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// Returns the first stage of the fixed sequence not yet completed.
    #[must_use]
    pub fn next_stage(&self) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .find(|s| !self.completed_stages.contains(s))
    }
}
