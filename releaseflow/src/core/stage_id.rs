//! Stage identifiers and the context fields stages depend on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a pipeline stage, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    /// Register remote entities and resolve the product version.
    Configure,
    /// Build the component group remotely.
    Build,
    /// Assemble the artifact repository.
    #[serde(rename = "repository")]
    RepositoryGeneration,
    /// Collect the sources bundle.
    #[serde(rename = "sources")]
    SourcesGeneration,
    /// Generate API documentation.
    #[serde(rename = "javadoc")]
    JavadocGeneration,
    /// Generate the license report.
    #[serde(rename = "licenses")]
    LicensesGeneration,
    /// Prepare the shared-content analysis input.
    #[serde(rename = "shared-content")]
    SharedContentAnalysis,
    /// Generate release documents.
    #[serde(rename = "documents")]
    DocumentsGeneration,
    /// Run registered post-processing hooks.
    AddOns,
    /// Promote builds and close the milestone.
    Release,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 10] = [
        Self::Configure,
        Self::Build,
        Self::RepositoryGeneration,
        Self::SourcesGeneration,
        Self::JavadocGeneration,
        Self::LicensesGeneration,
        Self::SharedContentAnalysis,
        Self::DocumentsGeneration,
        Self::AddOns,
        Self::Release,
    ];

    /// Returns the stable name used in persisted state and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::RepositoryGeneration => "repository",
            Self::SourcesGeneration => "sources",
            Self::JavadocGeneration => "javadoc",
            Self::LicensesGeneration => "licenses",
            Self::SharedContentAnalysis => "shared-content",
            Self::DocumentsGeneration => "documents",
            Self::AddOns => "add-ons",
            Self::Release => "release",
        }
    }

    /// Returns the zero-based position in the fixed sequence.
    #[must_use]
    pub fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(Self::ALL.len())
    }

    /// Returns true for stages that may initialise a fresh run.
    #[must_use]
    pub fn is_starting_point(self) -> bool {
        matches!(self, Self::Configure | Self::Build)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown stage '{0}'")]
pub struct UnknownStageError(pub String);

impl FromStr for StageId {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStageError(s.to_string()))
    }
}

/// A field of the persisted context that a stage may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    /// The resolved product version.
    FullVersion,
    /// The remote entity ids registered by Configure.
    ImportResult,
    /// The remote build outcomes.
    BuildGroupResult,
    /// The generated artifact repository descriptor.
    RepositoryManifest,
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullVersion => write!(f, "full version"),
            Self::ImportResult => write!(f, "import result"),
            Self::BuildGroupResult => write!(f, "build group result"),
            Self::RepositoryManifest => write!(f, "repository manifest"),
        }
    }
}
