//! In-memory fakes of the remote collaborators.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures::sample_artifact;
use crate::core::{ArtifactRef, ComponentBuild, DocumentArtifact, DocumentKind};
use crate::remote::{
    ArtifactSource, BranchInspector, BuildTrigger, ComponentOutcome, DocumentGenerator,
    DocumentGenerators, DocumentRequest, EntityQuery, EntityRegistries, EntityRegistry,
    GroupBuildHandle, GroupBuildRequest, GroupBuildState, GroupBuildStatus, Milestone,
    MilestoneState, PromotionReceipt, PromotionRequest, ReleaseService, RemoteEntity,
    RemoteError, ResolvedRevision, RevisionKind,
};
use crate::stages::{AddOn, AddOnInvocation, StagePorts};
use crate::utils::sha256_hex;

/// Entity registry keeping entities in creation order.
#[derive(Debug)]
pub struct InMemoryRegistry<E> {
    entities: RwLock<Vec<E>>,
    next_id: AtomicUsize,
    updates: AtomicUsize,
}

impl<E> Default for InMemoryRegistry<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            updates: AtomicUsize::new(0),
        }
    }
}

impl<E: RemoteEntity> InMemoryRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Snapshot of the stored entities in creation order.
    #[must_use]
    pub fn entities(&self) -> Vec<E> {
        self.entities.read().clone()
    }

    /// Number of successful updates.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: RemoteEntity> EntityRegistry<E> for InMemoryRegistry<E> {
    async fn create(&self, entity: E) -> Result<E, RemoteError> {
        let id = format!("{}-{}", E::KIND.path(), self.next_id.fetch_add(1, Ordering::SeqCst));
        let entity = entity.with_id(id);
        self.entities.write().push(entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &str) -> Result<Option<E>, RemoteError> {
        Ok(self.entities.read().iter().find(|e| e.id() == id).cloned())
    }

    async fn list(&self, query: &EntityQuery) -> Result<Vec<E>, RemoteError> {
        Ok(self
            .entities
            .read()
            .iter()
            .filter(|e| e.matches(query))
            .cloned()
            .collect())
    }

    async fn update(&self, entity: E) -> Result<E, RemoteError> {
        let mut entities = self.entities.write();
        let slot = entities
            .iter_mut()
            .find(|e| e.id() == entity.id())
            .ok_or_else(|| RemoteError::not_found(E::KIND.to_string(), entity.id()))?;
        *slot = entity.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(entity)
    }
}

/// Branch inspector resolving every revision to a stable fake commit.
///
/// Unset revisions resolve to a branch head derived from the URL and
/// revision, so repeated runs see unchanged sources.
#[derive(Debug, Default)]
pub struct FakeBranchInspector {
    overrides: Mutex<BTreeMap<(String, String), Result<ResolvedRevision, RemoteError>>>,
    calls: AtomicUsize,
}

impl FakeBranchInspector {
    /// Creates the inspector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the resolution of one revision.
    pub fn set(&self, scm_url: &str, revision: &str, resolved: ResolvedRevision) {
        self.overrides
            .lock()
            .insert((scm_url.to_string(), revision.to_string()), Ok(resolved));
    }

    /// Makes one revision fail to resolve.
    pub fn fail(&self, scm_url: &str, revision: &str, error: RemoteError) {
        self.overrides
            .lock()
            .insert((scm_url.to_string(), revision.to_string()), Err(error));
    }

    /// Number of resolutions requested.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BranchInspector for FakeBranchInspector {
    async fn resolve(&self, scm_url: &str, revision: &str) -> Result<ResolvedRevision, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (scm_url.to_string(), revision.to_string());
        if let Some(pinned) = self.overrides.lock().get(&key) {
            return pinned.clone();
        }
        let digest = sha256_hex(format!("{scm_url}#{revision}"));
        Ok(ResolvedRevision::new(&digest[..12], RevisionKind::Branch))
    }
}

/// Build service finishing every submitted group on the first poll.
///
/// Successful builds become the latest build of their component.
#[derive(Debug, Default)]
pub struct FakeBuildTrigger {
    latest: Mutex<BTreeMap<String, ComponentBuild>>,
    failures: Mutex<BTreeMap<String, String>>,
    no_rebuild: Mutex<BTreeSet<String>>,
    requests: Mutex<Vec<GroupBuildRequest>>,
    hang: AtomicBool,
}

impl FakeBuildTrigger {
    /// Creates the service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the latest successful build the service knows of.
    pub fn set_latest(&self, build: ComponentBuild) {
        self.latest.lock().insert(build.component.clone(), build);
    }

    /// Makes a component fail in every later group build.
    pub fn fail_component(&self, component: &str, message: &str) {
        self.failures
            .lock()
            .insert(component.to_string(), message.to_string());
    }

    /// Clears scripted component failures.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Makes the service report an existing build as still valid.
    pub fn report_no_rebuild(&self, component: &str) {
        self.no_rebuild.lock().insert(component.to_string());
    }

    /// Keeps every group build running until the caller gives up.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Every submitted request.
    #[must_use]
    pub fn requests(&self) -> Vec<GroupBuildRequest> {
        self.requests.lock().clone()
    }

    /// Component names of every submitted request.
    #[must_use]
    pub fn submitted(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.components.iter().map(|c| c.component.clone()).collect())
            .collect()
    }

    fn outcome(&self, component: &str, round: usize) -> ComponentOutcome {
        let build_id = format!("{component}-b{round}");
        if let Some(message) = self.failures.lock().get(component) {
            return ComponentOutcome::Failed {
                build_id: Some(build_id),
                message: message.clone(),
            };
        }
        if self.no_rebuild.lock().contains(component) {
            let reused = self
                .latest
                .lock()
                .get(component)
                .map_or_else(|| format!("{component}-b0"), |b| b.build_id.clone());
            return ComponentOutcome::NoRebuildRequired {
                build_id: reused,
                artifacts: vec![sample_artifact(component)],
            };
        }
        ComponentOutcome::Success {
            build_id,
            artifacts: vec![sample_artifact(component)],
        }
    }
}

#[async_trait]
impl BuildTrigger for FakeBuildTrigger {
    async fn latest_build(
        &self,
        component: &str,
        _config_id: &str,
    ) -> Result<Option<ComponentBuild>, RemoteError> {
        Ok(self.latest.lock().get(component).cloned())
    }

    async fn submit_group_build(
        &self,
        request: &GroupBuildRequest,
    ) -> Result<GroupBuildHandle, RemoteError> {
        let mut requests = self.requests.lock();
        requests.push(request.clone());
        Ok(GroupBuildHandle {
            id: format!("group-build-{}", requests.len()),
        })
    }

    async fn status(&self, handle: &GroupBuildHandle) -> Result<GroupBuildStatus, RemoteError> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Ok(GroupBuildStatus {
                state: GroupBuildState::Running,
                components: BTreeMap::new(),
            });
        }
        let round: usize = handle
            .id
            .rsplit('-')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| RemoteError::not_found("group build", &handle.id))?;
        let request = round
            .checked_sub(1)
            .and_then(|index| self.requests.lock().get(index).cloned())
            .ok_or_else(|| RemoteError::not_found("group build", &handle.id))?;
        let mut components = BTreeMap::new();
        for submission in &request.components {
            let outcome = self.outcome(&submission.component, round);
            if let ComponentOutcome::Success { build_id, artifacts } = &outcome {
                let build = ComponentBuild::success(
                    &submission.component,
                    build_id,
                    &submission.dependency_digest,
                )
                .with_artifacts(artifacts.clone());
                self.set_latest(build);
            }
            components.insert(submission.component.clone(), outcome);
        }
        Ok(GroupBuildStatus {
            state: GroupBuildState::Finished,
            components,
        })
    }
}

/// Artifact source returning a build's own artifacts plus scripted extras.
#[derive(Debug, Default)]
pub struct FakeArtifactSource {
    extras: Mutex<BTreeMap<String, Vec<ArtifactRef>>>,
}

impl FakeArtifactSource {
    /// Creates the source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact to the repository content of a component.
    pub fn add(&self, component: &str, artifact: ArtifactRef) {
        self.extras
            .lock()
            .entry(component.to_string())
            .or_default()
            .push(artifact);
    }
}

#[async_trait]
impl ArtifactSource for FakeArtifactSource {
    async fn repository_artifacts(
        &self,
        build: &ComponentBuild,
    ) -> Result<Vec<ArtifactRef>, RemoteError> {
        let mut artifacts = build.artifacts.clone();
        if let Some(extra) = self.extras.lock().get(&build.component) {
            artifacts.extend(extra.iter().cloned());
        }
        Ok(artifacts)
    }
}

/// Document generator writing a small JSON summary per request.
#[derive(Debug, Default)]
pub struct FakeDocumentGenerator {
    calls: Mutex<Vec<DocumentKind>>,
}

impl FakeDocumentGenerator {
    /// Creates the generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds requested so far.
    #[must_use]
    pub fn calls(&self) -> Vec<DocumentKind> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DocumentGenerator for FakeDocumentGenerator {
    async fn generate(&self, request: &DocumentRequest<'_>) -> Result<DocumentArtifact, RemoteError> {
        self.calls.lock().push(request.kind);
        let entries = request
            .manifest
            .map(|m| m.len())
            .or_else(|| request.builds.map(|b| b.len()))
            .unwrap_or(0);
        let path = request
            .output_dir
            .join(format!("{}-{}.json", request.prefix, request.kind));
        let body = serde_json::json!({
            "kind": request.kind,
            "full_version": request.full_version,
            "entries": entries,
        });
        tokio::fs::write(&path, body.to_string())
            .await
            .map_err(|err| RemoteError::service(format!("{}: {err}", path.display())))?;
        Ok(DocumentArtifact::new(request.kind, path, entries))
    }
}

/// Release service tracking promotions and closed milestones.
///
/// When linked to a milestone registry, closing also marks the registry
/// entity closed, as the real service does.
#[derive(Default)]
pub struct FakeReleaseService {
    closed: Mutex<BTreeSet<String>>,
    promotions: Mutex<Vec<PromotionRequest>>,
    receipts: Mutex<BTreeMap<String, PromotionReceipt>>,
    milestones: Option<Arc<InMemoryRegistry<Milestone>>>,
}

impl fmt::Debug for FakeReleaseService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeReleaseService")
            .field("closed", &self.closed.lock())
            .field("promotions", &self.promotions.lock().len())
            .finish_non_exhaustive()
    }
}

impl FakeReleaseService {
    /// Creates an unlinked service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that closes milestones in `milestones` too.
    #[must_use]
    pub fn linked(milestones: Arc<InMemoryRegistry<Milestone>>) -> Self {
        Self {
            milestones: Some(milestones),
            ..Self::default()
        }
    }

    /// Returns true if the milestone was closed.
    #[must_use]
    pub fn is_closed(&self, milestone_id: &str) -> bool {
        self.closed.lock().contains(milestone_id)
    }

    /// Every promotion request received.
    #[must_use]
    pub fn promotions(&self) -> Vec<PromotionRequest> {
        self.promotions.lock().clone()
    }
}

#[async_trait]
impl ReleaseService for FakeReleaseService {
    async fn milestone_state(&self, milestone_id: &str) -> Result<MilestoneState, RemoteError> {
        if self.is_closed(milestone_id) {
            return Ok(MilestoneState::Closed);
        }
        Ok(MilestoneState::Open)
    }

    async fn promotion(&self, milestone_id: &str) -> Result<Option<PromotionReceipt>, RemoteError> {
        Ok(self.receipts.lock().get(milestone_id).cloned())
    }

    async fn promote(&self, request: &PromotionRequest) -> Result<PromotionReceipt, RemoteError> {
        if self.is_closed(&request.milestone_id) {
            return Err(RemoteError::conflict("milestone", "milestone is closed"));
        }
        self.promotions.lock().push(request.clone());
        let nvrs = request
            .builds
            .iter()
            .map(|b| format!("{}-{}", b.component, b.build_id))
            .collect();
        let receipt = PromotionReceipt { nvrs };
        self.receipts
            .lock()
            .insert(request.milestone_id.clone(), receipt.clone());
        Ok(receipt)
    }

    async fn close_milestone(&self, milestone_id: &str) -> Result<(), RemoteError> {
        if !self.closed.lock().insert(milestone_id.to_string()) {
            return Err(RemoteError::conflict("milestone", "milestone is already closed"));
        }
        if let Some(registry) = &self.milestones {
            if let Some(mut milestone) = registry.get(milestone_id).await? {
                milestone.closed = true;
                registry.update(milestone).await?;
            }
        }
        Ok(())
    }
}

/// Add-on recording the parameters of every invocation.
#[derive(Debug)]
pub struct RecordingAddOn {
    name: String,
    failure: Option<String>,
    invocations: Mutex<Vec<serde_json::Value>>,
}

impl RecordingAddOn {
    /// Creates an add-on that succeeds with `"<name> done"`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: None,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Creates an add-on that always fails with `message`.
    #[must_use]
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(name)
        }
    }

    /// Parameters of every invocation.
    #[must_use]
    pub fn invocations(&self) -> Vec<serde_json::Value> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl AddOn for RecordingAddOn {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, invocation: &AddOnInvocation<'_>) -> anyhow::Result<String> {
        self.invocations.lock().push(invocation.parameters.clone());
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(format!("{} done", self.name)),
        }
    }
}

/// One fake of every collaborator, wired together.
#[derive(Debug)]
pub struct FakeServices {
    /// Products.
    pub products: Arc<InMemoryRegistry<crate::remote::Product>>,
    /// Product versions.
    pub versions: Arc<InMemoryRegistry<crate::remote::ProductVersion>>,
    /// Milestones, shared with the release service.
    pub milestones: Arc<InMemoryRegistry<Milestone>>,
    /// Projects.
    pub projects: Arc<InMemoryRegistry<crate::remote::Project>>,
    /// Build configurations.
    pub build_configs: Arc<InMemoryRegistry<crate::remote::BuildConfig>>,
    /// Group configurations.
    pub group_configs: Arc<InMemoryRegistry<crate::remote::GroupConfig>>,
    /// Branch inspector.
    pub inspector: Arc<FakeBranchInspector>,
    /// Build service.
    pub builds: Arc<FakeBuildTrigger>,
    /// Repository content source.
    pub artifacts: Arc<FakeArtifactSource>,
    /// Generator registered for every document kind.
    pub documents: Arc<FakeDocumentGenerator>,
    /// Release service.
    pub releases: Arc<FakeReleaseService>,
    /// The `notes` add-on configured by the sample configuration.
    pub notes: Arc<RecordingAddOn>,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServices {
    /// Creates a fresh set of fakes.
    #[must_use]
    pub fn new() -> Self {
        let milestones = Arc::new(InMemoryRegistry::new());
        Self {
            products: Arc::new(InMemoryRegistry::new()),
            versions: Arc::new(InMemoryRegistry::new()),
            releases: Arc::new(FakeReleaseService::linked(Arc::clone(&milestones))),
            milestones,
            projects: Arc::new(InMemoryRegistry::new()),
            build_configs: Arc::new(InMemoryRegistry::new()),
            group_configs: Arc::new(InMemoryRegistry::new()),
            inspector: Arc::new(FakeBranchInspector::new()),
            builds: Arc::new(FakeBuildTrigger::new()),
            artifacts: Arc::new(FakeArtifactSource::new()),
            documents: Arc::new(FakeDocumentGenerator::new()),
            notes: Arc::new(RecordingAddOn::new("notes")),
        }
    }

    /// The entity registries.
    #[must_use]
    pub fn registries(&self) -> EntityRegistries {
        EntityRegistries {
            products: self.products.clone(),
            versions: self.versions.clone(),
            milestones: self.milestones.clone(),
            projects: self.projects.clone(),
            build_configs: self.build_configs.clone(),
            group_configs: self.group_configs.clone(),
        }
    }

    /// Ports for the standard runners.
    #[must_use]
    pub fn ports(&self) -> StagePorts {
        let documents: Arc<dyn DocumentGenerator> = self.documents.clone();
        StagePorts::new(
            self.registries(),
            self.inspector.clone(),
            self.builds.clone(),
            self.artifacts.clone(),
            self.releases.clone(),
        )
        .with_documents(DocumentGenerators::new().with_all(&documents))
        .with_add_on(self.notes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Project;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_registry_assigns_ids_and_counts_updates() {
        let registry = InMemoryRegistry::<Project>::new();
        let created = registry
            .create(Project {
                id: String::new(),
                name: "core".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.id, "projects-1");
        registry.update(created.clone()).await.unwrap();
        assert_eq!(registry.updates(), 1);
        assert_eq!(registry.entities(), vec![created]);
    }

    #[tokio::test]
    async fn test_update_of_unknown_entity_fails() {
        let registry = InMemoryRegistry::<Project>::new();
        let err = registry
            .update(Project {
                id: "nope".to_string(),
                name: "core".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_default_resolution_is_stable() {
        let inspector = FakeBranchInspector::new();
        let first = inspector.resolve("https://git/x.git", "main").await.unwrap();
        let second = inspector.resolve("https://git/x.git", "main").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.commit.len(), 12);
        assert_eq!(inspector.calls(), 2);
    }

    #[tokio::test]
    async fn test_closing_twice_conflicts() {
        let service = FakeReleaseService::new();
        service.close_milestone("m1").await.unwrap();
        assert!(matches!(
            service.close_milestone("m1").await,
            Err(RemoteError::Conflict { .. })
        ));
        assert_eq!(service.milestone_state("m1").await.unwrap(), MilestoneState::Closed);
    }

    #[tokio::test]
    async fn test_promotion_is_recorded_per_milestone() {
        let service = FakeReleaseService::new();
        assert_eq!(service.promotion("m1").await.unwrap(), None);

        let request = PromotionRequest {
            milestone_id: "m1".to_string(),
            builds: vec![ComponentBuild::success("core", "b1", "digest")],
        };
        service.promote(&request).await.unwrap();

        let receipt = service.promotion("m1").await.unwrap().unwrap();
        assert_eq!(receipt.nvrs, vec!["core-b1"]);
        assert_eq!(service.promotion("m2").await.unwrap(), None);
    }
}
