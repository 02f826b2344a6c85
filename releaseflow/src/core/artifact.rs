//! Artifact coordinates, references, and generated documents.

use crate::core::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Maven-style coordinate of a single artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactCoordinate {
    /// Group identifier, e.g. `org.example`.
    pub group_id: String,
    /// Artifact identifier.
    pub artifact_id: String,
    /// Version string.
    pub version: String,
    /// Optional classifier, e.g. `sources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// File extension, e.g. `jar` or `pom`.
    pub extension: String,
}

impl ArtifactCoordinate {
    /// Creates a coordinate without classifier.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            extension: extension.into(),
        }
    }

    /// Sets the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Returns the component identity: the coordinate without version.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        (&self.group_id, &self.artifact_id)
    }

    /// Returns the path of the file inside a Maven repository layout.
    #[must_use]
    pub fn repository_path(&self) -> String {
        let classifier = self
            .classifier
            .as_ref()
            .map(|c| format!("-{c}"))
            .unwrap_or_default();
        format!(
            "{}/{}/{}/{}-{}{}.{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.artifact_id,
            self.version,
            classifier,
            self.extension
        )
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.extension)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, ":{}", self.version)
    }
}

/// An artifact together with where it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The artifact coordinate.
    pub coordinate: ArtifactCoordinate,
    /// Storage location (URL or local path).
    pub location: String,
    /// SHA-256 of the file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ArtifactRef {
    /// Creates a new artifact reference.
    #[must_use]
    pub fn new(coordinate: ArtifactCoordinate, location: impl Into<String>) -> Self {
        Self {
            coordinate,
            location: location.into(),
            sha256: None,
        }
    }

    /// Sets the checksum.
    #[must_use]
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

/// Kinds of documents produced alongside the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// Source bundle of every built component.
    Sources,
    /// API documentation bundle.
    Javadoc,
    /// License report for the repository content.
    Licenses,
    /// Shared-content analysis input.
    SharedContent,
    /// Release notes and other documents.
    Documents,
}

impl DocumentKind {
    /// All document kinds, in stage order.
    pub const ALL: [Self; 5] = [
        Self::Sources,
        Self::Javadoc,
        Self::Licenses,
        Self::SharedContent,
        Self::Documents,
    ];

    /// Returns the stage producing this document.
    #[must_use]
    pub fn stage(self) -> StageId {
        match self {
            Self::Sources => StageId::SourcesGeneration,
            Self::Javadoc => StageId::JavadocGeneration,
            Self::Licenses => StageId::LicensesGeneration,
            Self::SharedContent => StageId::SharedContentAnalysis,
            Self::Documents => StageId::DocumentsGeneration,
        }
    }

    /// Returns the document kind produced by a stage, if it is a document stage.
    #[must_use]
    pub fn for_stage(stage: StageId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.stage() == stage)
    }

    /// Returns a short label for messages and file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Javadoc => "javadoc",
            Self::Licenses => "licenses",
            Self::SharedContent => "shared-content",
            Self::Documents => "documents",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document produced by a generator back end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentArtifact {
    /// The document kind.
    pub kind: DocumentKind,
    /// Where the document was written.
    pub location: PathBuf,
    /// Number of entries (artifacts, components, licenses) covered.
    pub entries: usize,
    /// When the document was generated.
    pub generated_at: DateTime<Utc>,
}

impl DocumentArtifact {
    /// Creates a new document artifact stamped with the current time.
    #[must_use]
    pub fn new(kind: DocumentKind, location: impl Into<PathBuf>, entries: usize) -> Self {
        Self {
            kind,
            location: location.into(),
            entries,
            generated_at: Utc::now(),
        }
    }

    /// Returns true if the document covers at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_display() {
        let coordinate = ArtifactCoordinate::new("org.example", "core", "1.0", "jar")
            .with_classifier("sources");
        assert_eq!(coordinate.to_string(), "org.example:core:jar:sources:1.0");
    }

    #[test]
    fn test_repository_path() {
        let coordinate = ArtifactCoordinate::new("org.example.app", "core", "1.0", "pom");
        assert_eq!(coordinate.repository_path(), "org/example/app/core/1.0/core-1.0.pom");

        let sources = coordinate.clone().with_classifier("sources");
        assert_eq!(sources.repository_path(), "org/example/app/core/1.0/core-1.0-sources.pom");
    }

    #[test]
    fn test_identity_ignores_version() {
        let a = ArtifactCoordinate::new("g", "a", "1.0", "jar");
        let b = ArtifactCoordinate::new("g", "a", "1.1", "jar");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_document_kind_stage_mapping() {
        for kind in DocumentKind::ALL {
            assert_eq!(DocumentKind::for_stage(kind.stage()), Some(kind));
        }
        assert_eq!(DocumentKind::for_stage(StageId::Build), None);
    }
}
