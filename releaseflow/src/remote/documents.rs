//! Document generator contract.

use super::RemoteError;
use crate::core::{BuildGroupResult, DocumentArtifact, DocumentKind, RepositoryManifest};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Input handed to a document generator.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRequest<'a> {
    /// Which document to produce.
    pub kind: DocumentKind,
    /// The product version.
    pub full_version: &'a str,
    /// Build outcomes, when recorded.
    pub builds: Option<&'a BuildGroupResult>,
    /// Repository descriptor, when generated.
    pub manifest: Option<&'a RepositoryManifest>,
    /// Directory the document is written to.
    pub output_dir: &'a Path,
    /// File name prefix, the release directory name.
    pub prefix: &'a str,
}

/// Produces one kind of document from build and repository data.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Generates the document.
    async fn generate(&self, request: &DocumentRequest<'_>) -> Result<DocumentArtifact, RemoteError>;
}

/// Generators registered per document kind.
#[derive(Clone, Default)]
pub struct DocumentGenerators {
    generators: BTreeMap<DocumentKind, Arc<dyn DocumentGenerator>>,
}

impl DocumentGenerators {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the generator for a kind, replacing any previous one.
    #[must_use]
    pub fn with(mut self, kind: DocumentKind, generator: Arc<dyn DocumentGenerator>) -> Self {
        self.generators.insert(kind, generator);
        self
    }

    /// Registers one generator for every kind.
    #[must_use]
    pub fn with_all(mut self, generator: &Arc<dyn DocumentGenerator>) -> Self {
        for kind in DocumentKind::ALL {
            self.generators.insert(kind, Arc::clone(generator));
        }
        self
    }

    /// Returns the generator for a kind.
    #[must_use]
    pub fn get(&self, kind: DocumentKind) -> Option<Arc<dyn DocumentGenerator>> {
        self.generators.get(&kind).cloned()
    }
}

impl fmt::Debug for DocumentGenerators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentGenerators")
            .field("kinds", &self.generators.keys().collect::<Vec<_>>())
            .finish()
    }
}
