//! # Releaseflow
//!
//! A resumable orchestrator for multi-stage product releases.
//!
//! A release runs a fixed sequence of stages (configure, build, repository,
//! documents, add-ons, release) against remote services. Every stage reads a
//! persisted context and returns a delta; the orchestrator merges the delta
//! and checkpoints the context before the next stage starts, so an interrupted
//! release resumes where it stopped.
//!
//! - **Fixed stage sequence**: per-stage skip flags, forced re-runs and
//!   starting-point stages that begin a new run
//! - **Durable context**: atomic JSON checkpoints with a cheap progress index
//! - **Rebuild policies**: force, explicit and implicit dependency checks
//! - **Narrow service contracts**: build, artifact, document and release
//!   services behind async traits, with a REST adapter and in-memory fakes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use releaseflow::prelude::*;
//!
//! let facade = CommandFacade::new(ports);
//! let output = facade.run(Path::new("releases/widget-1.0"), &RunOptions::new()).await?;
//! println!("{:?}", output.release_path);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod facade;
pub mod observability;
pub mod pipeline;
pub mod remote;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ReleaseConfig, RunOptions};
    pub use crate::context::{ContextDelta, PersistedContext, Progress};
    pub use crate::core::{
        BuildGroupResult, BuildStatus, ComponentBuild, DocumentKind, RebuildPolicy, StageId,
    };
    pub use crate::errors::{
        ConfigError, FailureKind, ReleaseflowError, StageFailure, StoreError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::facade::{CommandFacade, RunOutput};
    pub use crate::pipeline::{PipelineOrchestrator, PipelineResult, RunRequest};
    pub use crate::remote::{
        ArtifactSource, BranchInspector, BuildTrigger, DocumentGenerator, DocumentGenerators,
        EntityRegistries, ReleaseService,
    };
    pub use crate::stages::{AddOn, AddOnInvocation, StagePorts, StageRunner};
    pub use crate::store::{ContextStore, FsContextStore, InMemoryContextStore};
}
