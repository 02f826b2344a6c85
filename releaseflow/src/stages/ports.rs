//! StagePorts - the remote capabilities injected into stage runners.
//!
//! Stages only receive the ports they need; the bundle exists so callers wire
//! one value instead of seven.

use super::AddOn;
use crate::remote::{
    ArtifactSource, BranchInspector, BuildTrigger, DocumentGenerators, EntityRegistries,
    ReleaseService,
};
use std::fmt;
use std::sync::Arc;

/// Remote collaborators used by the standard stage runners.
#[derive(Clone)]
pub struct StagePorts {
    /// Entity CRUD used by Configure.
    pub registries: EntityRegistries,
    /// Source revision lookup for the branch check.
    pub inspector: Arc<dyn BranchInspector>,
    /// Group build submission and polling.
    pub builds: Arc<dyn BuildTrigger>,
    /// Repository content of finished builds.
    pub artifacts: Arc<dyn ArtifactSource>,
    /// Generators per document kind.
    pub documents: DocumentGenerators,
    /// Promotion and milestone closing.
    pub releases: Arc<dyn ReleaseService>,
    /// Registered post-processing hooks.
    pub add_ons: Vec<Arc<dyn AddOn>>,
}

impl fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagePorts")
            .field("documents", &self.documents)
            .field(
                "add_ons",
                &self.add_ons.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Bundles the collaborators with no document generators or add-ons.
    #[must_use]
    pub fn new(
        registries: EntityRegistries,
        inspector: Arc<dyn BranchInspector>,
        builds: Arc<dyn BuildTrigger>,
        artifacts: Arc<dyn ArtifactSource>,
        releases: Arc<dyn ReleaseService>,
    ) -> Self {
        Self {
            registries,
            inspector,
            builds,
            artifacts,
            documents: DocumentGenerators::new(),
            releases,
            add_ons: Vec::new(),
        }
    }

    /// Sets the document generators.
    #[must_use]
    pub fn with_documents(mut self, documents: DocumentGenerators) -> Self {
        self.documents = documents;
        self
    }

    /// Registers an add-on.
    #[must_use]
    pub fn with_add_on(mut self, add_on: Arc<dyn AddOn>) -> Self {
        self.add_ons.push(add_on);
        self
    }
}
