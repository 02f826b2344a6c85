//! Testing utilities for releaseflow pipelines.
//!
//! This module provides:
//! - In-memory fakes of every remote collaborator
//! - A sample configuration and prepared contexts
//! - A scriptable stage runner
//! - An end-to-end harness and assertions

mod assertions;
mod fakes;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_completed, assert_executed, assert_not_completed, assert_skipped_event,
    assert_stage_failure,
};
pub use fakes::{
    FakeArtifactSource, FakeBranchInspector, FakeBuildTrigger, FakeDocumentGenerator,
    FakeReleaseService, FakeServices, InMemoryRegistry, RecordingAddOn,
};
pub use fixtures::{
    build_delta, built_context, configure_delta, configured_context, sample_artifact,
    sample_config, ReleaseHarness, SAMPLE_CONFIG, SAMPLE_FULL_VERSION, SAMPLE_GROUP,
};
pub use mocks::MockRunner;
