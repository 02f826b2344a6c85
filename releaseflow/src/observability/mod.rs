//! Observability utilities: subscriber setup, stage timing and event payloads.

mod stage_event;
mod subscriber;

pub use stage_event::{StageEvent, StageStatus, Stopwatch};
pub use subscriber::init_tracing;
