//! Production wiring of the stage ports.

use anyhow::{Context, Result};
use async_trait::async_trait;
use releaseflow::core::{DocumentArtifact, DocumentKind};
use releaseflow::remote::{
    BranchInspector, DocumentGenerator, DocumentGenerators, DocumentRequest, EntityRegistries,
    EntityRegistry, RemoteError, ResolvedRevision, RestClient, RevisionKind,
};
use releaseflow::remote::{BuildConfig, GroupConfig, Milestone, Product, ProductVersion, Project};
use releaseflow::stages::StagePorts;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Wires the REST client, the git inspector and the local document writer.
pub fn ports(service_url: &str, timeout: Duration) -> Result<StagePorts> {
    let client = Arc::new(
        RestClient::new(service_url, timeout)
            .with_context(|| format!("invalid service URL {service_url}"))?,
    );
    let registries = EntityRegistries {
        products: Arc::clone(&client) as Arc<dyn EntityRegistry<Product>>,
        versions: Arc::clone(&client) as Arc<dyn EntityRegistry<ProductVersion>>,
        milestones: Arc::clone(&client) as Arc<dyn EntityRegistry<Milestone>>,
        projects: Arc::clone(&client) as Arc<dyn EntityRegistry<Project>>,
        build_configs: Arc::clone(&client) as Arc<dyn EntityRegistry<BuildConfig>>,
        group_configs: Arc::clone(&client) as Arc<dyn EntityRegistry<GroupConfig>>,
    };
    let writer: Arc<dyn DocumentGenerator> = Arc::new(JsonDocumentWriter);
    Ok(StagePorts::new(
        registries,
        Arc::new(GitInspector),
        client.clone(),
        client.clone(),
        client,
    )
    .with_documents(DocumentGenerators::new().with_all(&writer)))
}

/// Resolves revisions with `git ls-remote`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitInspector;

#[async_trait]
impl BranchInspector for GitInspector {
    async fn resolve(&self, scm_url: &str, revision: &str) -> Result<ResolvedRevision, RemoteError> {
        if is_commit_id(revision) {
            return Ok(ResolvedRevision::new(revision, RevisionKind::Commit));
        }
        debug!(scm_url, revision, "git ls-remote");
        let output = Command::new("git")
            .args(["ls-remote", scm_url, revision])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| RemoteError::Transport(format!("cannot run git: {err}")))?;
        if !output.status.success() {
            return Err(RemoteError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_ls_remote(&String::from_utf8_lossy(&output.stdout), revision)
            .ok_or_else(|| RemoteError::not_found("revision", format!("{scm_url}#{revision}")))
    }
}

fn is_commit_id(revision: &str) -> bool {
    revision.len() == 40 && revision.chars().all(|c| c.is_ascii_hexdigit())
}

/// Picks the commit of `revision` from `git ls-remote` output.
///
/// Annotated tags are listed twice; the peeled `^{}` line names the commit.
fn parse_ls_remote(output: &str, revision: &str) -> Option<ResolvedRevision> {
    let refs: Vec<(&str, &str)> = output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .collect();
    let find = |name: &str| {
        refs.iter()
            .find(|(_, reference)| *reference == name)
            .map(|(commit, _)| (*commit).to_string())
    };

    let tag = format!("refs/tags/{revision}");
    if let Some(commit) = find(&format!("{tag}^{{}}")).or_else(|| find(&tag)) {
        return Some(ResolvedRevision::new(commit, RevisionKind::Tag));
    }
    find(&format!("refs/heads/{revision}"))
        .map(|commit| ResolvedRevision::new(commit, RevisionKind::Branch))
}

/// Writes each document as a JSON summary of the builds and repository content.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentWriter;

#[async_trait]
impl DocumentGenerator for JsonDocumentWriter {
    async fn generate(&self, request: &DocumentRequest<'_>) -> Result<DocumentArtifact, RemoteError> {
        let builds: Vec<_> = request
            .builds
            .map(|b| b.usable().collect())
            .unwrap_or_default();
        let artifacts = request.manifest.map(|m| m.artifacts.as_slice()).unwrap_or_default();
        let (body, entries) = match request.kind {
            DocumentKind::Licenses | DocumentKind::SharedContent => {
                (json!({ "artifacts": artifacts }), artifacts.len())
            }
            DocumentKind::Sources | DocumentKind::Javadoc | DocumentKind::Documents => {
                (json!({ "builds": builds }), builds.len())
            }
        };
        let document = json!({
            "kind": request.kind,
            "full_version": request.full_version,
            "content": body,
        });

        tokio::fs::create_dir_all(request.output_dir)
            .await
            .map_err(|err| RemoteError::service(err.to_string()))?;
        let location = request
            .output_dir
            .join(format!("{}-{}.json", request.prefix, request.kind));
        let payload =
            serde_json::to_vec_pretty(&document).map_err(|err| RemoteError::service(err.to_string()))?;
        tokio::fs::write(&location, payload)
            .await
            .map_err(|err| RemoteError::service(format!("{}: {err}", location.display())))?;
        Ok(DocumentArtifact::new(request.kind, location, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use releaseflow::testing::{built_context, sample_config};

    const LS_REMOTE: &str = "\
1111111111111111111111111111111111111111\trefs/heads/main
2222222222222222222222222222222222222222\trefs/tags/1.0.0
3333333333333333333333333333333333333333\trefs/tags/1.0.0^{}
";

    #[test]
    fn test_branch_resolves_to_head() {
        let resolved = parse_ls_remote(LS_REMOTE, "main").unwrap();
        assert_eq!(resolved.kind, RevisionKind::Branch);
        assert!(resolved.commit.starts_with('1'));
    }

    #[test]
    fn test_annotated_tag_resolves_to_peeled_commit() {
        let resolved = parse_ls_remote(LS_REMOTE, "1.0.0").unwrap();
        assert_eq!(resolved.kind, RevisionKind::Tag);
        assert!(resolved.commit.starts_with('3'));
    }

    #[test]
    fn test_unknown_revision() {
        assert!(parse_ls_remote(LS_REMOTE, "feature").is_none());
    }

    #[tokio::test]
    async fn test_commit_id_is_not_looked_up() {
        let commit = "a".repeat(40);
        let resolved = GitInspector.resolve("https://invalid.example", &commit).await.unwrap();
        assert_eq!(resolved, ResolvedRevision::new(commit, RevisionKind::Commit));
    }

    #[tokio::test]
    async fn test_writer_summarises_builds() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path()).unwrap();
        let context = built_context(&config);
        let request = DocumentRequest {
            kind: DocumentKind::Sources,
            full_version: "1.0.CR1",
            builds: context.build_group_result(),
            manifest: None,
            output_dir: dir.path(),
            prefix: "widget-1.0.CR1",
        };

        let document = JsonDocumentWriter.generate(&request).await.unwrap();

        assert_eq!(document.entries, 3);
        assert_eq!(
            document.location,
            dir.path().join("widget-1.0.CR1-sources.json")
        );
        assert!(document.location.exists());
    }
}
