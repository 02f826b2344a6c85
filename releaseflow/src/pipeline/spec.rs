//! The fixed stage sequence and per-run stage selection.

use crate::config::RunOptions;
use crate::core::{ContextField, RebuildPolicy, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static descriptor of a stage in the release sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    /// The stage.
    pub id: StageId,
    /// Context fields that must be present before the stage runs.
    pub requires: &'static [ContextField],
    /// Whether a skip flag may exclude the stage.
    pub skippable: bool,
    /// Whether invoking the stage alone starts a new run.
    pub starting_point: bool,
}

impl StageSpec {
    const fn new(id: StageId, requires: &'static [ContextField], starting_point: bool) -> Self {
        Self {
            id,
            requires,
            skippable: true,
            starting_point,
        }
    }

    const fn fixed(mut self) -> Self {
        self.skippable = false;
        self
    }

    /// Returns the descriptor of a stage.
    #[must_use]
    pub fn of(id: StageId) -> &'static Self {
        &PIPELINE[id.position()]
    }
}

use ContextField::{BuildGroupResult, FullVersion, ImportResult, RepositoryManifest};

/// Every stage in execution order.
pub static PIPELINE: [StageSpec; 10] = [
    StageSpec::new(StageId::Configure, &[], true),
    StageSpec::new(StageId::Build, &[FullVersion, ImportResult], true),
    StageSpec::new(StageId::RepositoryGeneration, &[BuildGroupResult], false),
    StageSpec::new(StageId::SourcesGeneration, &[BuildGroupResult], false),
    StageSpec::new(StageId::JavadocGeneration, &[BuildGroupResult], false),
    StageSpec::new(StageId::LicensesGeneration, &[RepositoryManifest], false),
    StageSpec::new(
        StageId::SharedContentAnalysis,
        &[BuildGroupResult, RepositoryManifest],
        false,
    ),
    StageSpec::new(StageId::DocumentsGeneration, &[RepositoryManifest], false).fixed(),
    StageSpec::new(StageId::AddOns, &[BuildGroupResult], false).fixed(),
    StageSpec::new(
        StageId::Release,
        &[FullVersion, ImportResult, BuildGroupResult],
        false,
    ),
];

/// How the orchestrator obtains the context a run starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Continue the persisted context, skipping completed stages.
    Resume,
    /// Rewind the persisted context to the first requested stage.
    Restart,
    /// Discard persisted state and start fresh.
    Clean,
}

/// Which stages one invocation runs and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Stages requested, whatever their order.
    pub stages: BTreeSet<StageId>,
    /// Requested stages excluded by skip flags.
    pub skipped: BTreeSet<StageId>,
    /// Stages re-run even when already completed.
    pub forced: BTreeSet<StageId>,
    /// Rebuild policy for the Build stage.
    pub policy: RebuildPolicy,
    /// Where the context comes from.
    pub mode: ContextMode,
}

impl RunRequest {
    /// The whole sequence with the options' skip flags applied.
    #[must_use]
    pub fn full(options: &RunOptions) -> Self {
        let skipped = options
            .skipped_stages()
            .into_iter()
            .filter(|s| StageSpec::of(*s).skippable)
            .collect();
        Self {
            stages: StageId::ALL.into_iter().collect(),
            skipped,
            forced: BTreeSet::new(),
            policy: options.rebuild_mode,
            mode: if options.clean {
                ContextMode::Clean
            } else {
                ContextMode::Resume
            },
        }
    }

    /// A single stage, as invoked by its own command.
    ///
    /// The stage runs even if it completed before. Starting points rewind the
    /// context to themselves; every other stage continues the existing one.
    #[must_use]
    pub fn single(stage: StageId, options: &RunOptions) -> Self {
        let mode = if options.clean {
            ContextMode::Clean
        } else if StageSpec::of(stage).starting_point {
            ContextMode::Restart
        } else {
            ContextMode::Resume
        };
        Self {
            stages: BTreeSet::from([stage]),
            skipped: BTreeSet::new(),
            forced: BTreeSet::from([stage]),
            policy: options.rebuild_mode,
            mode,
        }
    }

    /// Returns true if the run resumes the persisted context.
    #[must_use]
    pub fn resume(&self) -> bool {
        self.mode == ContextMode::Resume
    }

    /// The first stage that will actually be considered.
    #[must_use]
    pub fn first_stage(&self) -> Option<StageId> {
        self.stages
            .iter()
            .copied()
            .find(|s| !self.skipped.contains(s))
    }
}
