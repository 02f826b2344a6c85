//! Source revision inspection used by the branch check.

use super::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a revision name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    /// A branch; its head may move.
    Branch,
    /// A tag; expected to be immutable.
    Tag,
    /// A commit id.
    Commit,
}

/// A revision resolved to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRevision {
    /// The commit id.
    pub commit: String,
    /// The revision kind.
    pub kind: RevisionKind,
}

impl ResolvedRevision {
    /// Creates a resolved revision.
    #[must_use]
    pub fn new(commit: impl Into<String>, kind: RevisionKind) -> Self {
        Self {
            commit: commit.into(),
            kind,
        }
    }
}

/// Resolves source revisions to commits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BranchInspector: Send + Sync {
    /// Resolves `revision` in the repository at `scm_url`.
    async fn resolve(&self, scm_url: &str, revision: &str) -> Result<ResolvedRevision, RemoteError>;
}
