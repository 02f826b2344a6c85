//! Release: promotes the builds and closes the milestone.

use super::{StageContext, StageRunner};
use crate::context::ContextDelta;
use crate::core::{ComponentBuild, ReleaseOutput, StageId};
use crate::errors::{FailureKind, StageFailure};
use crate::remote::{MilestoneState, PromotionRequest, ReleaseService, RemoteError};
use async_trait::async_trait;
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const STAGE: StageId = StageId::Release;

/// File name of the generated upload script.
pub const UPLOAD_SCRIPT_NAME: &str = "upload-to-candidates.sh";

fn remote(err: RemoteError) -> StageFailure {
    StageFailure::remote(STAGE, err)
}

/// Promotes usable builds, writes the deliverables list, closes the
/// milestone and writes the upload script.
pub struct ReleaseStage {
    releases: Arc<dyn ReleaseService>,
}

impl fmt::Debug for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseStage").finish_non_exhaustive()
    }
}

impl ReleaseStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(releases: Arc<dyn ReleaseService>) -> Self {
        Self { releases }
    }
}

fn upload_script(release_path: &Path, release_dir_name: &str, storage_url: Option<&str>) -> String {
    let target = storage_url.map_or_else(
        || "${RELEASE_STORAGE_URL:?set RELEASE_STORAGE_URL or pass --release-storage-url}".to_string(),
        |url| url.trim_end_matches('/').to_string(),
    );
    let mut script = String::from("#!/bin/sh\nset -eu\n\n");
    let _ = writeln!(script, "# Uploads {release_dir_name} to the candidates area.");
    let _ = writeln!(script, "SOURCE=\"{}\"", release_path.display());
    let _ = writeln!(script, "TARGET=\"{target}/{release_dir_name}\"");
    script.push_str("\nrsync -rlp --info=progress2 \"$SOURCE/\" \"$TARGET/\"\n");
    script
}

async fn write_file(path: &Path, content: &str) -> Result<(), StageFailure> {
    tokio::fs::write(path, content)
        .await
        .map_err(|err| StageFailure::io(STAGE, path, &err))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), StageFailure> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|err| StageFailure::io(STAGE, path, &err))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), StageFailure> {
    Ok(())
}

#[async_trait]
impl StageRunner for ReleaseStage {
    fn stage(&self) -> StageId {
        STAGE
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let full_version = ctx.full_version(STAGE)?;
        let import = ctx.import_result(STAGE)?;
        let builds = ctx.builds(STAGE)?;

        let state = self
            .releases
            .milestone_state(&import.milestone_id)
            .await
            .map_err(remote)?;
        let earlier = self
            .releases
            .promotion(&import.milestone_id)
            .await
            .map_err(remote)?;
        if state == MilestoneState::Closed {
            let message = match &earlier {
                Some(receipt) => format!(
                    "milestone {full_version} is already closed; {} builds were promoted to it",
                    receipt.nvrs.len()
                ),
                None => format!("milestone {full_version} is already closed"),
            };
            return Err(StageFailure::conflict(STAGE, message));
        }
        if builds.has_temporary_builds() {
            return Err(StageFailure::new(
                STAGE,
                FailureKind::Precondition,
                "temporary builds cannot be released; rebuild without --temp-build",
            ));
        }
        let promotable: Vec<ComponentBuild> = builds.usable().cloned().collect();
        if promotable.is_empty() {
            return Err(StageFailure::new(
                STAGE,
                FailureKind::Precondition,
                "no successful builds to release",
            ));
        }
        for build in builds.builds.values().filter(|b| !b.status.is_usable()) {
            warn!(component = %build.component, build = %build.build_id, "Skipping unsuccessful build");
        }

        let receipt = if let Some(receipt) = earlier {
            info!(promoted = receipt.nvrs.len(), "Milestone already promoted, reusing the promotion");
            receipt
        } else {
            let request = PromotionRequest {
                milestone_id: import.milestone_id.clone(),
                builds: promotable,
            };
            let receipt = self.releases.promote(&request).await.map_err(remote)?;
            info!(promoted = receipt.nvrs.len(), "Builds promoted");
            receipt
        };

        let release_dir_name = ctx.config.release_dir_name(full_version);
        let release_path = ctx.config.release_path(full_version);
        tokio::fs::create_dir_all(&release_path)
            .await
            .map_err(|err| StageFailure::io(STAGE, &release_path, &err))?;
        let nvr_list = release_path.join(format!("{release_dir_name}-nvr-list.txt"));
        let mut listing = receipt.nvrs.join("\n");
        listing.push('\n');
        write_file(&nvr_list, &listing).await?;

        self.releases
            .close_milestone(&import.milestone_id)
            .await
            .map_err(remote)?;
        info!(milestone = %import.milestone_name, "Milestone closed");

        let script_path = release_path.join(UPLOAD_SCRIPT_NAME);
        let storage_url = ctx.options.release_storage_url.as_deref();
        if storage_url.is_none() {
            warn!("No release storage URL given; the upload script reads RELEASE_STORAGE_URL");
        }
        write_file(&script_path, &upload_script(&release_path, &release_dir_name, storage_url)).await?;
        make_executable(&script_path).await?;

        let output = ReleaseOutput {
            milestone_id: import.milestone_id.clone(),
            milestone_name: import.milestone_name.clone(),
            release_dir_name,
            release_path,
            nvr_list,
            upload_script: script_path,
            promoted: receipt.nvrs.len(),
        };
        Ok(ContextDelta::new().with_release_output(output))
    }
}
