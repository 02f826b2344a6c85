//! Repository generation: collects the artifacts of the usable builds.

use super::{StageContext, StageRunner};
use crate::context::ContextDelta;
use crate::core::{compare_versions, ArtifactCoordinate, ArtifactRef, RepositoryManifest, RepositorySource, StageId};
use crate::errors::StageFailure;
use crate::remote::{ArtifactSource, RemoteError};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const STAGE: StageId = StageId::RepositoryGeneration;

/// File extensions in a Maven layout that are not artifacts themselves.
const SIDECAR_EXTENSIONS: [&str; 5] = ["md5", "sha1", "sha256", "sha512", "asc"];

/// Assembles the repository manifest from remote builds or a local snapshot.
pub struct RepositoryStage {
    artifacts: Arc<dyn ArtifactSource>,
}

impl fmt::Debug for RepositoryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryStage").finish_non_exhaustive()
    }
}

impl RepositoryStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(artifacts: Arc<dyn ArtifactSource>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl StageRunner for RepositoryStage {
    fn stage(&self) -> StageId {
        STAGE
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let builds = ctx.builds(STAGE)?;
        let full_version = ctx.full_version(STAGE)?;

        let (mut artifacts, source) = match &ctx.options.repo_zip_path {
            Some(snapshot) => {
                info!(snapshot = %snapshot.display(), "Reading repository snapshot");
                (read_snapshot(snapshot).await?, RepositorySource::Snapshot)
            }
            None => {
                let mut collected = Vec::new();
                for build in builds.usable() {
                    let mut artifacts = self
                        .artifacts
                        .repository_artifacts(build)
                        .await
                        .map_err(|err: RemoteError| StageFailure::remote(STAGE, err))?;
                    debug!(component = %build.component, count = artifacts.len(), "Collected artifacts");
                    collected.append(&mut artifacts);
                }
                (collected, RepositorySource::Remote)
            }
        };

        let deduplicated = ctx.options.remove_generated_duplicates;
        if deduplicated {
            let before = artifacts.len();
            artifacts = deduplicate(artifacts);
            info!(removed = before - artifacts.len(), "Removed superseded artifact versions");
        } else {
            artifacts.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));
            artifacts.dedup_by(|a, b| a.coordinate == b.coordinate);
        }

        let release_path = ctx.config.release_path(full_version);
        let location = release_path.join(format!(
            "{}-maven-repository.json",
            ctx.config.release_dir_name(full_version)
        ));
        let manifest = RepositoryManifest {
            location: location.clone(),
            source,
            deduplicated,
            artifacts,
        };
        tokio::fs::create_dir_all(&release_path)
            .await
            .map_err(|err| StageFailure::io(STAGE, &release_path, &err))?;
        let payload = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| StageFailure::configuration(STAGE, err.to_string()))?;
        tokio::fs::write(&location, payload)
            .await
            .map_err(|err| StageFailure::io(STAGE, &location, &err))?;
        info!(
            manifest = %location.display(),
            artifacts = manifest.len(),
            "Repository manifest written"
        );

        Ok(ContextDelta::new().with_repository_manifest(manifest))
    }
}

/// Keeps only the highest version of each artifact.
///
/// Artifacts are grouped by group and artifact id; every file of the highest
/// version survives, whatever its classifier or extension. The result is
/// sorted by coordinate.
#[must_use]
pub fn deduplicate(artifacts: Vec<ArtifactRef>) -> Vec<ArtifactRef> {
    let mut highest: BTreeMap<(String, String), String> = BTreeMap::new();
    for artifact in &artifacts {
        let (group, id) = artifact.coordinate.identity();
        let key = (group.to_string(), id.to_string());
        let version = &artifact.coordinate.version;
        match highest.get(&key) {
            Some(best) if compare_versions(version, best) != Ordering::Greater => {}
            _ => {
                highest.insert(key, version.clone());
            }
        }
    }

    let mut kept: Vec<ArtifactRef> = artifacts
        .into_iter()
        .filter(|artifact| {
            let (group, id) = artifact.coordinate.identity();
            highest
                .get(&(group.to_string(), id.to_string()))
                .is_some_and(|best| *best == artifact.coordinate.version)
        })
        .collect();
    kept.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));
    kept.dedup_by(|a, b| a.coordinate == b.coordinate);
    kept
}

/// Reads artifacts from an externally supplied repository snapshot.
///
/// The snapshot is either a directory in Maven layout or a manifest JSON file
/// written by an earlier repository generation.
///
/// # Errors
///
/// Returns a configuration failure if the path is missing, is an archive, or
/// cannot be parsed.
pub async fn read_snapshot(path: &Path) -> Result<Vec<ArtifactRef>, StageFailure> {
    let metadata = tokio::fs::metadata(path).await.map_err(|err| {
        StageFailure::configuration(STAGE, format!("repository snapshot {}: {err}", path.display()))
    })?;

    if metadata.is_dir() {
        let root = path.to_path_buf();
        return tokio::task::spawn_blocking(move || scan_maven_layout(&root))
            .await
            .map_err(|err| StageFailure::configuration(STAGE, err.to_string()))?;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let content = tokio::fs::read(path)
                .await
                .map_err(|err| StageFailure::io(STAGE, path, &err))?;
            let manifest: RepositoryManifest = serde_json::from_slice(&content).map_err(|err| {
                StageFailure::configuration(
                    STAGE,
                    format!("invalid repository manifest {}: {err}", path.display()),
                )
            })?;
            Ok(manifest.artifacts)
        }
        Some("zip") => Err(StageFailure::configuration(
            STAGE,
            format!(
                "zip snapshots are not supported, extract {} and pass the directory",
                path.display()
            ),
        )),
        _ => Err(StageFailure::configuration(
            STAGE,
            format!(
                "repository snapshot {} must be a directory or a manifest .json file",
                path.display()
            ),
        )),
    }
}

fn scan_maven_layout(root: &Path) -> Result<Vec<ArtifactRef>, StageFailure> {
    let mut artifacts = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|err| StageFailure::io(STAGE, &dir, &err))?;
        for entry in entries {
            let entry = entry.map_err(|err| StageFailure::io(STAGE, &dir, &err))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Some(coordinate) = path
                .strip_prefix(root)
                .ok()
                .and_then(coordinate_from_path)
            {
                artifacts.push(ArtifactRef::new(coordinate, path.display().to_string()));
            }
        }
    }
    debug!(root = %root.display(), count = artifacts.len(), "Scanned repository snapshot");
    Ok(artifacts)
}

/// Parses `group/path/artifact/version/artifact-version[-classifier].ext`.
fn coordinate_from_path(relative: &Path) -> Option<ArtifactCoordinate> {
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if parts.len() < 4 {
        return None;
    }
    let (file, rest) = parts.split_last()?;
    let (version, rest) = rest.split_last()?;
    let (artifact_id, group) = rest.split_last()?;

    let tail = file.strip_prefix(&format!("{artifact_id}-{version}"))?;
    let (classifier, extension) = if let Some(ext) = tail.strip_prefix('.') {
        (None, ext)
    } else {
        let (classifier, ext) = tail.strip_prefix('-')?.split_once('.')?;
        (Some(classifier), ext)
    };
    if extension.is_empty() || extension.rsplit('.').next().is_some_and(|e| SIDECAR_EXTENSIONS.contains(&e)) {
        return None;
    }

    let mut coordinate = ArtifactCoordinate::new(group.join("."), *artifact_id, *version, extension);
    if let Some(classifier) = classifier {
        coordinate = coordinate.with_classifier(classifier);
    }
    Some(coordinate)
}
