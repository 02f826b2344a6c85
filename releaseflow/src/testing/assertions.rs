//! Test assertions for pipeline results and events.

use crate::context::PersistedContext;
use crate::core::StageId;
use crate::errors::{FailureKind, ReleaseflowError};
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineResult;

/// Asserts that the run executed exactly `expected`, in order.
pub fn assert_executed(result: &PipelineResult, expected: &[StageId]) {
    assert_eq!(
        result.executed, expected,
        "Expected executed stages {:?}, got {:?}",
        expected, result.executed
    );
}

/// Asserts that the context records `stage` as completed.
pub fn assert_completed(context: &PersistedContext, stage: StageId) {
    assert!(
        context.is_completed(stage),
        "Expected stage '{}' to be completed, completed: {:?}",
        stage,
        context.completed_stages()
    );
}

/// Asserts that the context does not record `stage` as completed.
pub fn assert_not_completed(context: &PersistedContext, stage: StageId) {
    assert!(
        !context.is_completed(stage),
        "Expected stage '{}' not to be completed",
        stage
    );
}

/// Asserts that the error is a stage failure of `stage` with `kind`.
pub fn assert_stage_failure(err: &ReleaseflowError, stage: StageId, kind: FailureKind) {
    let Some(failure) = err.as_stage_failure() else {
        panic!("Expected a stage failure of '{stage}', got: {err}");
    };
    assert_eq!(failure.stage, stage, "Failure attributed to the wrong stage: {failure}");
    assert_eq!(failure.kind, kind, "Unexpected failure kind: {failure}");
}

/// Asserts that the sink received a `stage.skipped` event for `stage`.
pub fn assert_skipped_event(sink: &CollectingEventSink, stage: StageId) {
    let skipped = sink.stages_for("stage.skipped");
    assert!(
        skipped.iter().any(|s| s == stage.as_str()),
        "Expected a skip event for '{}', got {:?}",
        stage,
        skipped
    );
}
