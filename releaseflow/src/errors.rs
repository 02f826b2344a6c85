//! Error types for the releaseflow pipeline.
//!
//! Every failure surfaced to a caller names the stage it came from (when one
//! was running) and carries enough detail to decide whether resuming the run
//! with different flags can succeed.

use crate::context::ContextDelta;
use crate::core::{ContextField, StageId};
use crate::remote::RemoteError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for releaseflow operations.
#[derive(Debug, Error)]
pub enum ReleaseflowError {
    /// The release configuration is missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage failed.
    #[error("{0}")]
    Stage(#[from] StageFailure),

    /// Writing the checkpoint after a successful stage failed.
    #[error("Checkpoint after stage '{stage}' failed: {source}")]
    Checkpoint {
        /// The stage whose result could not be persisted.
        stage: StageId,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// Reading or initialising persisted state failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The run was interrupted between stages.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),
}

impl ReleaseflowError {
    /// Returns the stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Stage(failure) => Some(failure.stage),
            Self::Checkpoint { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the stage failure, if this error wraps one.
    #[must_use]
    pub fn as_stage_failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Stage(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns true if re-invoking the run (possibly with adjusted flags) can succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Stage(failure) => failure.recoverable,
            Self::Cancelled(_) => true,
            Self::Config(_) | Self::Checkpoint { .. } | Self::Store(_) => false,
        }
    }
}

/// Errors raised while loading or validating the release configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Release configuration not found: {}", path.display())]
    Missing {
        /// The expected file path.
        path: PathBuf,
    },

    /// The configuration file could not be read.
    #[error("Failed to read {}: {message}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying error message.
        message: String,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The parser message.
        message: String,
    },

    /// A field holds an invalid value.
    #[error("Invalid configuration field '{field}': {message}")]
    Invalid {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A component depends on a name that is not part of the group.
    #[error("Component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        /// The declaring component.
        component: String,
        /// The unresolved dependency name.
        dependency: String,
    },

    /// Component dependencies form a cycle.
    #[error("Dependency cycle between components: {}", cycle.join(" -> "))]
    CycleDetected {
        /// The components forming the cycle, first repeated last.
        cycle: Vec<String>,
    },

    /// A command-line option holds an unsupported value.
    #[error("Invalid value '{value}' for option '{option}', expected one of: {}", expected.join(", "))]
    InvalidOption {
        /// The option name.
        option: String,
        /// The rejected value.
        value: String,
        /// Accepted values.
        expected: Vec<String>,
    },
}

impl ConfigError {
    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or invalid configuration, unresolvable version.
    Configuration,
    /// A required prior output is absent from the context.
    Precondition,
    /// A remote entity exists in an incompatible state.
    RemoteConflict,
    /// Some components of the build group failed.
    PartialBuild,
    /// Transport or service error talking to a remote collaborator.
    Remote,
    /// The stage was interrupted by the caller.
    Cancelled,
    /// A post-processing hook failed.
    AddOn,
    /// The stage produced output contradicting recorded state.
    Integrity,
    /// Reading or writing local release files failed.
    Io,
}

impl FailureKind {
    /// Returns whether failures of this kind can be fixed by resuming the run.
    #[must_use]
    pub fn is_recoverable_by_default(self) -> bool {
        matches!(
            self,
            Self::Precondition
                | Self::PartialBuild
                | Self::Remote
                | Self::Cancelled
                | Self::AddOn
                | Self::Io
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Precondition => write!(f, "precondition"),
            Self::RemoteConflict => write!(f, "remote conflict"),
            Self::PartialBuild => write!(f, "partial build"),
            Self::Remote => write!(f, "remote"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AddOn => write!(f, "add-on"),
            Self::Integrity => write!(f, "integrity"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Failure detail for a single component of the build group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    /// The component name.
    pub component: String,
    /// The remote build id, when one was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl ComponentFailure {
    /// Creates a new component failure.
    #[must_use]
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            build_id: None,
            message: message.into(),
        }
    }

    /// Sets the remote build id.
    #[must_use]
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }
}

/// Error returned by a stage runner.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed ({kind}): {message}")]
pub struct StageFailure {
    /// The failing stage.
    pub stage: StageId,
    /// The failure classification.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
    /// Per-component detail for partial build failures.
    pub components: Vec<ComponentFailure>,
    /// Whether resuming the run can succeed.
    pub recoverable: bool,
    /// Results the stage did obtain; persisted without completing the stage.
    pub partial: Option<Box<ContextDelta>>,
}

impl StageFailure {
    /// Creates a new stage failure with the kind's default recoverability.
    #[must_use]
    pub fn new(stage: StageId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            components: Vec::new(),
            recoverable: kind.is_recoverable_by_default(),
            partial: None,
        }
    }

    /// Creates a configuration failure.
    #[must_use]
    pub fn configuration(stage: StageId, message: impl Into<String>) -> Self {
        Self::new(stage, FailureKind::Configuration, message)
    }

    /// Creates a precondition failure for a missing context field.
    #[must_use]
    pub fn precondition(stage: StageId, field: ContextField) -> Self {
        Self::new(
            stage,
            FailureKind::Precondition,
            format!("required {field} is missing from the pipeline context; run the stage producing it or resume without skipping it"),
        )
    }

    /// Creates a conflict failure.
    #[must_use]
    pub fn conflict(stage: StageId, message: impl Into<String>) -> Self {
        Self::new(stage, FailureKind::RemoteConflict, message)
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(stage: StageId, reason: impl Into<String>) -> Self {
        Self::new(stage, FailureKind::Cancelled, reason)
    }

    /// Creates a failure for a local file operation.
    #[must_use]
    pub fn io(stage: StageId, path: &std::path::Path, error: &std::io::Error) -> Self {
        Self::new(stage, FailureKind::Io, format!("{}: {error}", path.display()))
    }

    /// Maps a remote collaborator error onto a stage failure.
    #[must_use]
    pub fn remote(stage: StageId, error: RemoteError) -> Self {
        let kind = match error {
            RemoteError::Conflict { .. } => FailureKind::RemoteConflict,
            RemoteError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Remote,
        };
        Self::new(stage, kind, error.to_string())
    }

    /// Overrides recoverability.
    #[must_use]
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Attaches per-component failure detail.
    #[must_use]
    pub fn with_components(mut self, components: Vec<ComponentFailure>) -> Self {
        self.components = components;
        self
    }

    /// Attaches the partial results obtained before failing.
    #[must_use]
    pub fn with_partial(mut self, delta: ContextDelta) -> Self {
        self.partial = Some(Box::new(delta));
        self
    }

    /// Returns the names of the failed components.
    #[must_use]
    pub fn failed_components(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.component.as_str()).collect()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("recoverable".to_string(), serde_json::json!(self.recoverable));
        if !self.components.is_empty() {
            map.insert("components".to_string(), serde_json::json!(self.components));
        }
        map
    }
}

/// Errors raised by a context store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Filesystem error.
    #[error("I/O error on {}: {message}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying error message.
        message: String,
    },

    /// The persisted record could not be (de)serialised.
    #[error("Corrupt pipeline state in {}: {message}", path.display())]
    Serialization {
        /// The file path.
        path: PathBuf,
        /// The serde message.
        message: String,
    },

    /// The persisted record was written by a newer schema.
    #[error("Unsupported pipeline state schema {found} (supported: {supported})")]
    UnsupportedSchema {
        /// The schema version found on disk.
        found: u32,
        /// The newest schema this build understands.
        supported: u32,
    },
}

/// Raised when a delta would overwrite a set-once context field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Context field '{field}' is already set to '{existing}' and cannot change to '{incoming}'")]
pub struct ContextConflictError {
    /// The field being written.
    pub field: String,
    /// Rendering of the recorded value.
    pub existing: String,
    /// Rendering of the rejected value.
    pub incoming: String,
}

impl ContextConflictError {
    /// Creates a new context conflict error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        existing: impl Into<String>,
        incoming: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            existing: existing.into(),
            incoming: incoming.into(),
        }
    }
}
