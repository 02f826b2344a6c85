//! Pipeline lifecycle events.
//!
//! The orchestrator reports every lifecycle transition to an [`EventSink`].
//! Event payloads are JSON objects carrying at least the run id and, for stage
//! events, the stage name.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use std::fmt;

/// Lifecycle events emitted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    /// A run started.
    PipelineStarted,
    /// A stage is about to execute.
    StageStarted,
    /// A stage completed and was checkpointed.
    StageCompleted,
    /// A stage was not executed (skip flag or already completed).
    StageSkipped,
    /// A stage failed.
    StageFailed,
    /// Every requested stage completed.
    PipelineCompleted,
    /// The run stopped on an error.
    PipelineFailed,
}

impl PipelineEvent {
    /// Returns the event type string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageSkipped => "stage.skipped",
            Self::StageFailed => "stage.failed",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineFailed => "pipeline.failed",
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
