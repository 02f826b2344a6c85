//! Add-ons: caller-registered post-processing hooks.

use super::{StageContext, StageRunner};
use crate::config::ReleaseConfig;
use crate::context::{ContextDelta, PersistedContext};
use crate::core::{AddOnReport, StageId};
use crate::errors::{FailureKind, StageFailure};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const STAGE: StageId = StageId::AddOns;

/// Everything an add-on receives for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct AddOnInvocation<'a> {
    /// Parameters from the `[addons.<name>]` table.
    pub parameters: &'a serde_json::Value,
    /// The assembled context.
    pub context: &'a PersistedContext,
    /// The release configuration.
    pub config: &'a ReleaseConfig,
    /// The local release directory.
    pub release_path: &'a std::path::Path,
}

/// A post-processing hook run by the add-ons stage.
#[async_trait]
pub trait AddOn: Send + Sync {
    /// The name the hook is configured under.
    fn name(&self) -> &str;

    /// Runs the hook and returns a short summary.
    async fn run(&self, invocation: &AddOnInvocation<'_>) -> anyhow::Result<String>;
}

/// Runs every add-on configured under `[addons]`.
#[derive(Clone)]
pub struct AddOnsStage {
    add_ons: Vec<Arc<dyn AddOn>>,
}

impl fmt::Debug for AddOnsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddOnsStage")
            .field(
                "add_ons",
                &self.add_ons.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AddOnsStage {
    /// Creates the stage with the registered hooks.
    #[must_use]
    pub fn new(add_ons: Vec<Arc<dyn AddOn>>) -> Self {
        Self { add_ons }
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn AddOn>> {
        self.add_ons.iter().find(|a| a.name() == name)
    }
}

#[async_trait]
impl StageRunner for AddOnsStage {
    fn stage(&self) -> StageId {
        STAGE
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let release_path: PathBuf = ctx
            .context
            .full_version()
            .map(|v| ctx.config.release_path(v))
            .unwrap_or_else(|| ctx.config.target_dir());

        let mut reports = Vec::with_capacity(ctx.config.addons.len());
        for (name, parameters) in &ctx.config.addons {
            let Some(add_on) = self.find(name) else {
                warn!(add_on = %name, "Add-on is configured but not registered");
                reports.push(AddOnReport::failure(name, "add-on is not registered"));
                continue;
            };
            let invocation = AddOnInvocation {
                parameters,
                context: ctx.context,
                config: ctx.config,
                release_path: &release_path,
            };
            match add_on.run(&invocation).await {
                Ok(summary) => {
                    info!(add_on = %name, summary = %summary, "Add-on finished");
                    reports.push(AddOnReport::success(name, summary));
                }
                Err(err) => {
                    warn!(add_on = %name, error = %format!("{err:#}"), "Add-on failed");
                    reports.push(AddOnReport::failure(name, format!("{err:#}")));
                }
            }
        }

        let failed: Vec<&str> = reports
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.name.as_str())
            .collect();
        if !failed.is_empty() && ctx.config.flow.fail_on_addon_error {
            let message = format!("add-ons failed: {}", failed.join(", "));
            return Err(StageFailure::new(STAGE, FailureKind::AddOn, message)
                .with_partial(ContextDelta::new().with_add_on_reports(reports)));
        }
        Ok(ContextDelta::new().with_add_on_reports(reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::config::RunOptions;
    use crate::testing::{built_context, sample_config, RecordingAddOn};
    use pretty_assertions::assert_eq;

    async fn run(
        stage: &AddOnsStage,
        config: &ReleaseConfig,
    ) -> Result<ContextDelta, StageFailure> {
        let context = built_context(config);
        let options = RunOptions::new();
        let token = CancellationToken::new();
        let ctx = StageContext {
            context: &context,
            config,
            options: &options,
            policy: options.rebuild_mode,
            cancellation: &token,
        };
        stage.execute(&ctx).await
    }

    #[tokio::test]
    async fn test_configured_add_on_receives_parameters() {
        let config = sample_config("/configs/widget").unwrap();
        let notes = Arc::new(RecordingAddOn::new("notes"));
        let stage = AddOnsStage::new(vec![notes.clone()]);

        let delta = run(&stage, &config).await.unwrap();

        assert_eq!(delta.add_on_reports, vec![AddOnReport::success("notes", "notes done")]);
        assert_eq!(notes.invocations(), vec![serde_json::json!({"format": "markdown"})]);
    }

    #[tokio::test]
    async fn test_unregistered_add_on_is_reported() {
        let config = sample_config("/configs/widget").unwrap();
        let stage = AddOnsStage::new(Vec::new());

        let delta = run(&stage, &config).await.unwrap();

        assert_eq!(delta.add_on_reports.len(), 1);
        assert!(!delta.add_on_reports[0].success);
    }

    #[tokio::test]
    async fn test_failure_is_non_fatal_by_default() {
        let config = sample_config("/configs/widget").unwrap();
        let stage = AddOnsStage::new(vec![Arc::new(RecordingAddOn::failing("notes", "boom"))]);

        let delta = run(&stage, &config).await.unwrap();

        assert_eq!(delta.add_on_reports, vec![AddOnReport::failure("notes", "boom")]);
    }

    #[tokio::test]
    async fn test_failure_is_fatal_when_configured() {
        let mut config = sample_config("/configs/widget").unwrap();
        config.flow.fail_on_addon_error = true;
        let stage = AddOnsStage::new(vec![Arc::new(RecordingAddOn::failing("notes", "boom"))]);

        let err = run(&stage, &config).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::AddOn);
        assert!(err.recoverable);
        let partial = err.partial.unwrap();
        assert_eq!(partial.add_on_reports.len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_add_ons_do_not_run() {
        let config = sample_config("/configs/widget").unwrap();
        let other = Arc::new(RecordingAddOn::new("metrics"));
        let stage = AddOnsStage::new(vec![other.clone()]);

        run(&stage, &config).await.unwrap();

        assert!(other.invocations().is_empty());
    }
}
