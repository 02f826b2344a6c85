//! Build: submits the component group and waits for its outcome.

use super::{StageContext, StageRunner};
use crate::context::ContextDelta;
use crate::core::{ComponentBuild, RebuildCandidate, StageId};
use crate::errors::{ComponentFailure, FailureKind, StageFailure};
use crate::remote::{
    await_completion, BuildSubmission, BuildTrigger, ComponentOutcome, GroupBuildRequest,
    RemoteError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STAGE: StageId = StageId::Build;

fn remote(err: RemoteError) -> StageFailure {
    StageFailure::remote(STAGE, err)
}

/// Runs the group build selected by the active rebuild policy.
pub struct BuildStage {
    builds: Arc<dyn BuildTrigger>,
}

impl fmt::Debug for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildStage").finish_non_exhaustive()
    }
}

struct Candidate {
    inputs: RebuildCandidate,
    config_id: String,
    previous: Option<ComponentBuild>,
}

impl BuildStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(builds: Arc<dyn BuildTrigger>) -> Self {
        Self { builds }
    }

    async fn candidates(&self, ctx: &StageContext<'_>) -> Result<Vec<Candidate>, StageFailure> {
        let import = ctx.import_result(STAGE)?;
        let recorded = ctx.context.build_group_result();
        let mut candidates = Vec::new();
        for component in ctx.config.build_order() {
            let imported = import.components.get(&component.name).ok_or_else(|| {
                StageFailure::configuration(
                    STAGE,
                    format!(
                        "component '{}' is not registered; run configure again",
                        component.name
                    ),
                )
            })?;
            let previous = match recorded
                .and_then(|r| r.get(&component.name))
                .filter(|b| b.status.is_usable())
            {
                Some(build) => Some(build.clone()),
                None => self
                    .builds
                    .latest_build(&component.name, &imported.config_id)
                    .await
                    .map_err(remote)?,
            };
            candidates.push(Candidate {
                inputs: RebuildCandidate {
                    name: component.name.clone(),
                    dependencies: component.dependencies.clone(),
                    dependency_digest: component.dependency_digest(),
                    previous_digest: previous.as_ref().map(|b| b.dependency_digest.clone()),
                    previous_temporary: previous.as_ref().is_some_and(|b| b.temporary),
                    temporary: ctx.options.temp_build,
                    source_modified: imported.modified,
                },
                config_id: imported.config_id.clone(),
                previous,
            });
        }
        Ok(candidates)
    }
}

#[async_trait]
impl StageRunner for BuildStage {
    fn stage(&self) -> StageId {
        STAGE
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let import = ctx.import_result(STAGE)?;
        let group = ctx.config.group.clone();
        let candidates = self.candidates(ctx).await?;
        let inputs: Vec<RebuildCandidate> = candidates.iter().map(|c| c.inputs.clone()).collect();
        let selected = ctx.policy.select(&inputs);
        info!(
            policy = %ctx.policy,
            selected = selected.len(),
            total = candidates.len(),
            "Selected components to build"
        );

        let mut builds = Vec::with_capacity(candidates.len());
        let mut submissions = Vec::new();
        for candidate in candidates {
            if selected.contains(&candidate.inputs.name) {
                submissions.push(BuildSubmission {
                    component: candidate.inputs.name,
                    config_id: candidate.config_id,
                    dependency_digest: candidate.inputs.dependency_digest,
                });
            } else if let Some(previous) = candidate.previous {
                debug!(component = %candidate.inputs.name, build = %previous.build_id, "Reusing build");
                builds.push(previous.reused());
            }
        }

        if submissions.is_empty() {
            info!("Nothing to rebuild");
            return Ok(ContextDelta::new().with_builds(group, builds));
        }

        let request = GroupBuildRequest {
            group_config_id: import.group_id.clone(),
            components: submissions.clone(),
            policy: ctx.policy,
            temporary: ctx.options.temp_build,
            temporary_timestamp: ctx.options.temp_build_timestamp,
        };
        let handle = self.builds.submit_group_build(&request).await.map_err(remote)?;
        info!(handle = %handle.id, components = submissions.len(), "Group build submitted");

        let status = await_completion(
            self.builds.as_ref(),
            &handle,
            ctx.config.poll_interval(),
            ctx.cancellation,
        )
        .await
        .map_err(|err| match err {
            RemoteError::Cancelled => StageFailure::cancelled(
                STAGE,
                ctx.cancellation
                    .reason()
                    .unwrap_or_else(|| "build wait cancelled".to_string()),
            ),
            other => remote(other),
        })?;

        let mut failures = Vec::new();
        for submission in &submissions {
            let name = &submission.component;
            match status.components.get(name) {
                Some(ComponentOutcome::Success { build_id, artifacts }) => {
                    info!(component = %name, build = %build_id, "Component built");
                    builds.push(
                        ComponentBuild::success(name, build_id, &submission.dependency_digest)
                            .with_artifacts(artifacts.clone())
                            .temporary(ctx.options.temp_build),
                    );
                }
                Some(ComponentOutcome::NoRebuildRequired { build_id, artifacts }) => {
                    debug!(component = %name, build = %build_id, "Service reported no rebuild required");
                    builds.push(
                        ComponentBuild::success(name, build_id, &submission.dependency_digest)
                            .with_artifacts(artifacts.clone())
                            .temporary(ctx.options.temp_build)
                            .reused(),
                    );
                }
                Some(ComponentOutcome::Failed { build_id, message }) => {
                    warn!(component = %name, reason = %message, "Component build failed");
                    let mut failure = ComponentFailure::new(name, message);
                    if let Some(id) = build_id {
                        failure = failure.with_build_id(id);
                    }
                    failures.push(failure);
                }
                None => {
                    warn!(component = %name, "No outcome reported for component");
                    failures.push(ComponentFailure::new(name, "no outcome reported by the build service"));
                }
            }
        }

        for build in &mut builds {
            build.finished_at.get_or_insert_with(Utc::now);
        }
        let delta = ContextDelta::new().with_builds(group, builds);
        if failures.is_empty() {
            return Ok(delta);
        }
        let names: Vec<&str> = failures.iter().map(|f| f.component.as_str()).collect();
        let message = format!(
            "{} of {} submitted components failed: {}",
            failures.len(),
            submissions.len(),
            names.join(", ")
        );
        Err(StageFailure::new(STAGE, FailureKind::PartialBuild, message)
            .with_components(failures)
            .with_partial(delta))
    }
}
