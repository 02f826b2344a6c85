//! Core domain model types for releaseflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identifiers and the context fields they require
//! - The rebuild policy and its selection logic
//! - Build results, artifacts, documents and release records

mod artifact;
mod build;
mod policy;
mod records;
mod stage_id;
mod version;

pub use artifact::{ArtifactCoordinate, ArtifactRef, DocumentArtifact, DocumentKind};
pub use build::{BuildGroupResult, BuildStatus, ComponentBuild};
pub use policy::{RebuildCandidate, RebuildPolicy};
pub use records::{
    AddOnReport, ImportResult, ImportedComponent, ReleaseOutput, RepositoryManifest,
    RepositorySource,
};
pub use stage_id::{ContextField, StageId, UnknownStageError};
pub use version::compare_versions;
