//! Context management for release runs.
//!
//! This module provides:
//! - The persisted context, the durable record of a run's progress
//! - Context deltas, the only way stages contribute results
//! - The progress index read without loading the full record

#[cfg(test)]
mod context_tests;
mod delta;
mod persisted;

pub use delta::{BuildDelta, ContextDelta};
pub use persisted::{PersistedContext, Progress, SCHEMA_VERSION};
