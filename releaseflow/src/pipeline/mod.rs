//! Pipeline definition and execution.
//!
//! This module provides:
//! - The fixed stage sequence and the fields each stage requires
//! - Run requests selecting, skipping and forcing stages
//! - The checkpointing orchestrator

mod orchestrator;
mod result;
mod spec;

pub use orchestrator::PipelineOrchestrator;
pub use result::PipelineResult;
pub use spec::{ContextMode, RunRequest, StageSpec, PIPELINE};
