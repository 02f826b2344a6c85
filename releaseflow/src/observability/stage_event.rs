//! Payloads of stage events and the clock that times them.

use crate::core::StageId;
use crate::events::PipelineEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Where a stage is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// About to execute.
    Started,
    /// Executed and checkpointed.
    Completed,
    /// Not executed.
    Skipped,
    /// Execution or checkpoint failed.
    Failed,
}

/// Payload of a `stage.*` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Run identifier.
    pub run_id: Uuid,
    /// The stage.
    pub stage: StageId,
    /// Lifecycle status.
    pub status: StageStatus,
    /// Execution time, for completed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Why a stage was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageEvent {
    fn new(run_id: Uuid, stage: StageId, status: StageStatus) -> Self {
        Self {
            run_id,
            stage,
            status,
            duration_ms: None,
            reason: None,
            error: None,
        }
    }

    /// A stage is about to execute.
    #[must_use]
    pub fn started(run_id: Uuid, stage: StageId) -> Self {
        Self::new(run_id, stage, StageStatus::Started)
    }

    /// A stage completed in `duration_ms`.
    #[must_use]
    pub fn completed(run_id: Uuid, stage: StageId, duration_ms: f64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Self::new(run_id, stage, StageStatus::Completed)
        }
    }

    /// A stage was skipped.
    #[must_use]
    pub fn skipped(run_id: Uuid, stage: StageId, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(run_id, stage, StageStatus::Skipped)
        }
    }

    /// A stage failed.
    #[must_use]
    pub fn failed(run_id: Uuid, stage: StageId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(run_id, stage, StageStatus::Failed)
        }
    }

    /// The event type this payload is emitted under.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        let event = match self.status {
            StageStatus::Started => PipelineEvent::StageStarted,
            StageStatus::Completed => PipelineEvent::StageCompleted,
            StageStatus::Skipped => PipelineEvent::StageSkipped,
            StageStatus::Failed => PipelineEvent::StageFailed,
        };
        event.as_str()
    }

    /// Renders the payload as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Wall-clock timer for stages and runs.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Stopwatch {
    /// Starts timing.
    #[must_use]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds since the start.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.0.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stopwatch_measures_elapsed_time() {
        let watch = Stopwatch::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(watch.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_skipped_payload() {
        let run_id = Uuid::new_v4();
        let event = StageEvent::skipped(run_id, StageId::JavadocGeneration, "skip flag");
        let payload = event.to_json();

        assert_eq!(event.event_type(), "stage.skipped");
        assert_eq!(payload["stage"], "javadoc");
        assert_eq!(payload["status"], "skipped");
        assert_eq!(payload["reason"], "skip flag");
        assert_eq!(payload["run_id"], run_id.to_string());
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_completed_payload_carries_duration() {
        let event = StageEvent::completed(Uuid::nil(), StageId::Build, 12.5);
        assert_eq!(event.event_type(), "stage.completed");
        assert_eq!(event.to_json()["duration_ms"], 12.5);
    }
}
