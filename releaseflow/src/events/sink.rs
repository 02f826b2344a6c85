//! Destinations for pipeline lifecycle events.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

/// Receives pipeline lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event, e.g. `stage.completed` with its payload.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Delivers an event from synchronous code. Must never fail.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to the tracing subscriber.
///
/// Failures are logged at warn level, everything else at info.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

fn field<'a>(data: Option<&'a Value>, name: &str) -> &'a str {
    data.and_then(|d| d.get(name))
        .and_then(Value::as_str)
        .unwrap_or("-")
}

impl LoggingEventSink {
    fn log(event_type: &str, data: Option<&Value>) {
        let run_id = field(data, "run_id");
        let stage = field(data, "stage");
        if event_type.ends_with(".failed") {
            let error = field(data, "error");
            warn!(event = event_type, run_id, stage, error, "Pipeline event");
        } else {
            info!(event = event_type, run_id, stage, "Pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        Self::log(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        Self::log(event_type, data.as_ref());
    }
}

/// An event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event type, e.g. `stage.skipped`.
    pub event_type: String,
    /// Payload.
    pub data: Option<Value>,
}

impl RecordedEvent {
    /// The stage named by the payload, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.data.as_ref()?.get("stage")?.as_str()
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Captured event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Stages named by the captured events of one type.
    #[must_use]
    pub fn stages_for(&self, event_type: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.stage().map(str::to_string))
            .collect()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_missing_payload_fields_render_as_dash() {
        let data = json!({ "stage": "build" });
        assert_eq!(field(Some(&data), "stage"), "build");
        assert_eq!(field(Some(&data), "run_id"), "-");
        assert_eq!(field(None, "stage"), "-");
    }

    #[tokio::test]
    async fn test_logging_sink_accepts_failures() {
        LoggingEventSink
            .emit("stage.failed", Some(json!({ "stage": "build", "error": "boom" })))
            .await;
        LoggingEventSink.try_emit("pipeline.completed", None);
        NoOpEventSink.emit("stage.started", None).await;
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("stage.started", Some(json!({ "stage": "configure" }))).await;
        sink.emit("stage.completed", Some(json!({ "stage": "configure" }))).await;
        sink.try_emit("stage.skipped", Some(json!({ "stage": "javadoc" })));
        sink.try_emit("pipeline.completed", None);

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.stages_for("stage.skipped"), vec!["javadoc"]);
        assert_eq!(sink.event_types()[3], "pipeline.completed");
        assert_eq!(sink.events()[0].stage(), Some("configure"));
        assert_eq!(sink.events()[3].stage(), None);
    }
}
