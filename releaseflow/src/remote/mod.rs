//! Contracts of the remote collaborators the pipeline talks to.
//!
//! Every collaborator is an `async_trait` object so stages can be driven by
//! the REST adapter in production and by the in-memory fakes from
//! [`crate::testing`] in tests.

mod artifacts;
mod build;
mod documents;
mod entities;
#[cfg(feature = "http")]
mod http;
mod release;
mod scm;

pub use artifacts::ArtifactSource;
pub use build::{
    await_completion, BuildSubmission, BuildTrigger, ComponentOutcome, GroupBuildHandle,
    GroupBuildRequest, GroupBuildState, GroupBuildStatus,
};
pub use documents::{DocumentGenerator, DocumentGenerators, DocumentRequest};
pub use entities::{
    BuildConfig, EntityKind, EntityQuery, EntityRegistries, EntityRegistry, GroupConfig,
    Milestone, Product, ProductVersion, Project, RemoteEntity,
};
#[cfg(feature = "http")]
pub use http::RestClient;
pub use release::{MilestoneState, PromotionReceipt, PromotionRequest, ReleaseService};
#[cfg(test)]
pub use scm::MockBranchInspector;
pub use scm::{BranchInspector, ResolvedRevision, RevisionKind};

use thiserror::Error;

/// Errors reported by remote collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The entity exists in a state incompatible with the request.
    #[error("Conflict on {entity}: {message}")]
    Conflict {
        /// The entity kind or name.
        entity: String,
        /// What conflicts.
        message: String,
    },

    /// The entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// The entity kind.
        entity: String,
        /// The requested id.
        id: String,
    },

    /// The service could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected the request.
    #[error("Request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The collaborator ran but reported a failure.
    #[error("Service failure: {0}")]
    Service(String),

    /// The wait was interrupted by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a service failure.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }
}
