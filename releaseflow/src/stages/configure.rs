//! Configure: registers the release with the remote service.

use super::{StageContext, StageRunner};
use crate::config::{ComponentConfig, ProductConfig, ReleaseConfig};
use crate::context::ContextDelta;
use crate::core::{ImportResult, ImportedComponent, StageId};
use crate::errors::{ComponentFailure, StageFailure};
use crate::remote::{
    BranchInspector, BuildConfig, EntityQuery, EntityRegistries, GroupConfig, Milestone,
    Product, ProductVersion, Project, RemoteError, ResolvedRevision, RevisionKind,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STAGE: StageId = StageId::Configure;

fn remote(err: RemoteError) -> StageFailure {
    StageFailure::remote(STAGE, err)
}

/// Upserts product, version, milestone, projects, build configurations and
/// the group configuration, then resolves the full version.
pub struct ConfigureStage {
    registries: EntityRegistries,
    inspector: Arc<dyn BranchInspector>,
}

impl fmt::Debug for ConfigureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureStage").finish_non_exhaustive()
    }
}

impl ConfigureStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(registries: EntityRegistries, inspector: Arc<dyn BranchInspector>) -> Self {
        Self {
            registries,
            inspector,
        }
    }

    async fn upsert_product(&self, config: &ProductConfig) -> Result<Product, StageFailure> {
        let query = EntityQuery::all().eq("name", &config.name);
        match self.registries.products.find_one(&query).await.map_err(remote)? {
            Some(existing)
                if existing.abbreviation == config.abbreviation
                    && existing.description == config.description =>
            {
                Ok(existing)
            }
            Some(existing) => {
                debug!(product = %existing.name, "Updating product");
                let product = Product {
                    abbreviation: config.abbreviation.clone(),
                    description: config.description.clone(),
                    ..existing
                };
                self.registries.products.update(product).await.map_err(remote)
            }
            None => {
                info!(product = %config.name, "Registering product");
                let product = Product {
                    id: String::new(),
                    name: config.name.clone(),
                    abbreviation: config.abbreviation.clone(),
                    description: config.description.clone(),
                };
                self.registries.products.create(product).await.map_err(remote)
            }
        }
    }

    async fn upsert_version(
        &self,
        product: &Product,
        version: &str,
    ) -> Result<ProductVersion, StageFailure> {
        let query = EntityQuery::all()
            .eq("product_id", &product.id)
            .eq("version", version);
        if let Some(existing) = self.registries.versions.find_one(&query).await.map_err(remote)? {
            return Ok(existing);
        }
        info!(version, "Registering product version");
        let entity = ProductVersion {
            id: String::new(),
            product_id: product.id.clone(),
            version: version.to_string(),
        };
        self.registries.versions.create(entity).await.map_err(remote)
    }

    async fn resolve_milestone(
        &self,
        config: &ReleaseConfig,
        version: &ProductVersion,
    ) -> Result<Milestone, StageFailure> {
        let query = EntityQuery::all().eq("version_id", &version.id);
        let existing = self.registries.milestones.list(&query).await.map_err(remote)?;

        let name = if config.is_milestone_auto() {
            let prefix = config.milestone_prefix();
            let latest = existing
                .into_iter()
                .filter_map(|m| milestone_number(&m.name, prefix).map(|n| (n, m)))
                .max_by_key(|(n, _)| *n);
            match latest {
                Some((_, milestone)) if !milestone.closed => return Ok(milestone),
                Some((n, _)) => format!("{prefix}{}", n + 1),
                None => format!("{prefix}1"),
            }
        } else {
            match existing.into_iter().find(|m| m.name == config.milestone) {
                Some(milestone) if milestone.closed => {
                    return Err(StageFailure::conflict(
                        STAGE,
                        format!("milestone {} is already closed", milestone.full_version),
                    ));
                }
                Some(milestone) => return Ok(milestone),
                None => config.milestone.clone(),
            }
        };

        info!(milestone = %name, "Registering milestone");
        let milestone = Milestone {
            id: String::new(),
            version_id: version.id.clone(),
            full_version: format!("{}.{name}", config.version),
            name,
            closed: false,
        };
        self.registries.milestones.create(milestone).await.map_err(remote)
    }

    async fn upsert_projects(
        &self,
        components: &[ComponentConfig],
    ) -> Result<BTreeMap<String, Project>, StageFailure> {
        let mut projects = BTreeMap::new();
        for component in components {
            if projects.contains_key(&component.project) {
                continue;
            }
            let query = EntityQuery::all().eq("name", &component.project);
            let project = match self.registries.projects.find_one(&query).await.map_err(remote)? {
                Some(project) => project,
                None => {
                    debug!(project = %component.project, "Registering project");
                    let project = Project {
                        id: String::new(),
                        name: component.project.clone(),
                    };
                    self.registries.projects.create(project).await.map_err(remote)?
                }
            };
            projects.insert(component.project.clone(), project);
        }
        Ok(projects)
    }

    async fn existing_build_config(
        &self,
        component: &ComponentConfig,
        project: &Project,
    ) -> Result<Option<BuildConfig>, StageFailure> {
        let query = EntityQuery::all().eq("name", &component.name);
        let existing = self.registries.build_configs.find_one(&query).await.map_err(remote)?;
        match existing {
            Some(existing) if existing.project_id != project.id => Err(StageFailure::conflict(
                STAGE,
                format!(
                    "build config '{}' already exists under another project (id {}), expected project '{}'",
                    existing.name, existing.project_id, project.name
                ),
            )),
            other => Ok(other),
        }
    }

    async fn resolve_revisions(
        &self,
        components: &[&ComponentConfig],
    ) -> Result<Vec<ResolvedRevision>, StageFailure> {
        let lookups = components
            .iter()
            .map(|c| self.inspector.resolve(&c.scm_url, &c.revision));
        join_all(lookups)
            .await
            .into_iter()
            .zip(components)
            .map(|(resolved, component)| {
                resolved.map_err(|err| {
                    StageFailure::configuration(
                        STAGE,
                        format!(
                            "cannot resolve revision '{}' of component '{}': {err}",
                            component.revision, component.name
                        ),
                    )
                })
            })
            .collect()
    }

    async fn upsert_build_config(
        &self,
        existing: Option<BuildConfig>,
        wanted: BuildConfig,
    ) -> Result<BuildConfig, StageFailure> {
        let wanted = match &existing {
            Some(current) => BuildConfig {
                id: current.id.clone(),
                ..wanted
            },
            None => wanted,
        };
        match existing {
            Some(current) if current == wanted => Ok(current),
            Some(_) => {
                debug!(component = %wanted.name, "Updating build config");
                self.registries.build_configs.update(wanted).await.map_err(remote)
            }
            None => {
                debug!(component = %wanted.name, "Registering build config");
                self.registries.build_configs.create(wanted).await.map_err(remote)
            }
        }
    }

    async fn upsert_group(
        &self,
        config: &ReleaseConfig,
        version: &ProductVersion,
        build_config_ids: Vec<String>,
    ) -> Result<GroupConfig, StageFailure> {
        let query = EntityQuery::all().eq("name", &config.group);
        let wanted = GroupConfig {
            id: String::new(),
            name: config.group.clone(),
            version_id: version.id.clone(),
            build_config_ids,
        };
        match self.registries.group_configs.find_one(&query).await.map_err(remote)? {
            Some(existing)
                if existing.version_id == wanted.version_id
                    && existing.build_config_ids == wanted.build_config_ids =>
            {
                Ok(existing)
            }
            Some(existing) => {
                debug!(group = %config.group, "Updating group config");
                let group = GroupConfig {
                    id: existing.id,
                    ..wanted
                };
                self.registries.group_configs.update(group).await.map_err(remote)
            }
            None => {
                info!(group = %config.group, "Registering group config");
                self.registries.group_configs.create(wanted).await.map_err(remote)
            }
        }
    }
}

fn milestone_number(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Compares a freshly resolved revision with the recorded one.
///
/// Returns whether the component's sources moved, or the detail of a moved
/// tag, which is never accepted silently.
fn source_change(
    component: &ComponentConfig,
    existing: Option<&BuildConfig>,
    resolved: Option<&ResolvedRevision>,
) -> Result<bool, ComponentFailure> {
    let Some(existing) = existing else {
        return Ok(false);
    };
    if existing.revision != component.revision || existing.scm_url != component.scm_url {
        return Ok(true);
    }
    match (resolved, existing.recorded_commit.as_deref()) {
        (Some(resolved), Some(recorded)) if resolved.commit != recorded => match resolved.kind {
            RevisionKind::Tag => Err(ComponentFailure::new(
                &component.name,
                format!(
                    "tag '{}' moved from {recorded} to {}",
                    component.revision, resolved.commit
                ),
            )),
            RevisionKind::Branch | RevisionKind::Commit => Ok(true),
        },
        _ => Ok(false),
    }
}

#[async_trait]
impl StageRunner for ConfigureStage {
    fn stage(&self) -> StageId {
        STAGE
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let config = ctx.config;
        config
            .validate()
            .map_err(|err| StageFailure::configuration(STAGE, err.to_string()))?;
        info!(product = %config.product.name, version = %config.version, "Configuring release");

        let product = self.upsert_product(&config.product).await?;
        let version = self.upsert_version(&product, &config.version).await?;
        let milestone = self.resolve_milestone(config, &version).await?;
        let projects = self.upsert_projects(&config.components).await?;

        let components = config.build_order();
        let mut owners = Vec::with_capacity(components.len());
        let mut existing = Vec::with_capacity(components.len());
        for component in &components {
            let project = projects.get(&component.project).ok_or_else(|| {
                StageFailure::configuration(
                    STAGE,
                    format!("project '{}' was not registered", component.project),
                )
            })?;
            existing.push(self.existing_build_config(component, project).await?);
            owners.push(project);
        }

        let resolved = if ctx.options.skip_branch_check {
            debug!("Branch check skipped");
            vec![None; components.len()]
        } else {
            self.resolve_revisions(&components)
                .await?
                .into_iter()
                .map(Some)
                .collect()
        };

        let mut moved_tags = Vec::new();
        let mut modified = Vec::with_capacity(components.len());
        for ((component, existing), resolved) in components.iter().zip(&existing).zip(&resolved) {
            match source_change(component, existing.as_ref(), resolved.as_ref()) {
                Ok(changed) => {
                    if changed {
                        info!(component = %component.name, "Sources changed since last recorded");
                    }
                    modified.push(changed);
                }
                Err(failure) => {
                    warn!(component = %component.name, reason = %failure.message, "Tag moved");
                    moved_tags.push(failure);
                    modified.push(true);
                }
            }
        }
        if !moved_tags.is_empty() {
            let names: Vec<&str> = moved_tags.iter().map(|f| f.component.as_str()).collect();
            return Err(StageFailure::conflict(
                STAGE,
                format!("release tags moved since they were recorded: {}", names.join(", ")),
            )
            .with_components(moved_tags)
            .with_recoverable(true));
        }

        let mut imported = BTreeMap::new();
        let mut build_config_ids = Vec::with_capacity(components.len());
        let entries = components
            .iter()
            .zip(owners)
            .zip(existing)
            .zip(resolved)
            .zip(modified);
        for ((((component, project), existing), resolved), modified) in entries {
            let recorded_commit = resolved
                .as_ref()
                .map(|r| r.commit.clone())
                .or_else(|| existing.as_ref().and_then(|e| e.recorded_commit.clone()));
            let wanted = BuildConfig {
                id: String::new(),
                name: component.name.clone(),
                project_id: project.id.clone(),
                scm_url: component.scm_url.clone(),
                revision: component.revision.clone(),
                build_script: component.build_script.clone(),
                dependencies: component.dependencies.clone(),
                recorded_commit,
            };
            let build_config = self.upsert_build_config(existing, wanted).await?;
            build_config_ids.push(build_config.id.clone());
            imported.insert(
                component.name.clone(),
                ImportedComponent {
                    config_id: build_config.id,
                    project_id: project.id.clone(),
                    commit: resolved.map(|r| r.commit),
                    modified,
                },
            );
        }

        let group = self.upsert_group(config, &version, build_config_ids).await?;
        let full_version = format!("{}.{}", config.version, milestone.name);
        info!(full_version = %full_version, components = imported.len(), "Release configured");

        let import = ImportResult {
            product_id: product.id,
            version_id: version.id,
            milestone_id: milestone.id,
            milestone_name: milestone.name,
            group_id: group.id,
            components: imported,
        };
        Ok(ContextDelta::new()
            .with_full_version(full_version)
            .with_import_result(import))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::config::RunOptions;
    use crate::context::PersistedContext;
    use crate::errors::FailureKind;
    use crate::remote::{EntityRegistry, MockBranchInspector};
    use crate::testing::{sample_config, FakeServices};
    use pretty_assertions::assert_eq;

    async fn configure(
        services: &FakeServices,
        config: &ReleaseConfig,
        options: &RunOptions,
    ) -> Result<ContextDelta, StageFailure> {
        let stage = ConfigureStage::new(services.registries(), services.inspector.clone());
        let context = PersistedContext::new(config.directory(), config.signature());
        let token = CancellationToken::new();
        let ctx = StageContext {
            context: &context,
            config,
            options,
            policy: options.rebuild_mode,
            cancellation: &token,
        };
        stage.execute(&ctx).await
    }

    #[tokio::test]
    async fn test_registers_entities_and_resolves_version() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();

        let delta = configure(&services, &config, &RunOptions::new()).await.unwrap();

        assert_eq!(delta.full_version.as_deref(), Some("1.0.CR1"));
        let import = delta.import_result.unwrap();
        assert_eq!(import.milestone_name, "CR1");
        assert_eq!(import.components.len(), 3);
        assert_eq!(services.products.len(), 1);
        assert_eq!(services.projects.len(), 3);
        assert_eq!(services.build_configs.len(), 3);
        assert_eq!(services.group_configs.len(), 1);
        let group = services.group_configs.entities().remove(0);
        assert_eq!(group.build_config_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();

        let first = configure(&services, &config, &RunOptions::new()).await.unwrap();
        let second = configure(&services, &config, &RunOptions::new()).await.unwrap();

        assert_eq!(first.import_result, second.import_result);
        assert_eq!(services.build_configs.len(), 3);
        assert_eq!(services.milestones.len(), 1);
        assert_eq!(services.build_configs.updates(), 0);
    }

    #[tokio::test]
    async fn test_auto_milestone_picks_next_free_number() {
        let services = FakeServices::new();
        let content = crate::testing::SAMPLE_CONFIG.replace("milestone = \"CR1\"", "milestone = \"CR*\"");
        let config = ReleaseConfig::from_toml_str(&content, "/configs/widget").unwrap();

        let first = configure(&services, &config, &RunOptions::new()).await.unwrap();
        assert_eq!(first.full_version.as_deref(), Some("1.0.CR1"));

        // An open milestone is reused by a second configure.
        let again = configure(&services, &config, &RunOptions::new()).await.unwrap();
        assert_eq!(again.full_version.as_deref(), Some("1.0.CR1"));

        let mut milestone = services.milestones.entities().remove(0);
        milestone.closed = true;
        services.milestones.update(milestone).await.unwrap();

        let next = configure(&services, &config, &RunOptions::new()).await.unwrap();
        assert_eq!(next.full_version.as_deref(), Some("1.0.CR2"));
        assert_eq!(services.milestones.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_explicit_milestone_is_fatal() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();
        configure(&services, &config, &RunOptions::new()).await.unwrap();
        let mut milestone = services.milestones.entities().remove(0);
        milestone.closed = true;
        services.milestones.update(milestone).await.unwrap();

        let err = configure(&services, &config, &RunOptions::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteConflict);
        assert!(!err.recoverable);
        assert!(err.message.contains("1.0.CR1"));
    }

    #[tokio::test]
    async fn test_build_config_under_other_project_conflicts() {
        let services = FakeServices::new();
        services
            .build_configs
            .create(BuildConfig {
                id: String::new(),
                name: "core".to_string(),
                project_id: "someone-else".to_string(),
                scm_url: "https://git.example.com/other.git".to_string(),
                revision: "main".to_string(),
                build_script: "make".to_string(),
                dependencies: vec![],
                recorded_commit: None,
            })
            .await
            .unwrap();
        let config = sample_config("/configs/widget").unwrap();

        let err = configure(&services, &config, &RunOptions::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteConflict);
        assert!(err.message.contains("'core'"));
    }

    #[tokio::test]
    async fn test_moved_branch_marks_component_modified() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();
        configure(&services, &config, &RunOptions::new()).await.unwrap();

        let core = config.component("core").unwrap();
        services.inspector.set(
            &core.scm_url,
            &core.revision,
            ResolvedRevision::new("f00dfeed", RevisionKind::Branch),
        );
        let delta = configure(&services, &config, &RunOptions::new()).await.unwrap();

        let import = delta.import_result.unwrap();
        let modified: Vec<&str> = import.modified_components().collect();
        assert_eq!(modified, vec!["core"]);
        assert_eq!(import.components["core"].commit.as_deref(), Some("f00dfeed"));
    }

    #[tokio::test]
    async fn test_moved_tag_is_recoverable_conflict() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();
        let web = config.component("web").unwrap().clone();
        services.inspector.set(
            &web.scm_url,
            &web.revision,
            ResolvedRevision::new("aaaa1111", RevisionKind::Tag),
        );
        configure(&services, &config, &RunOptions::new()).await.unwrap();

        services.inspector.set(
            &web.scm_url,
            &web.revision,
            ResolvedRevision::new("bbbb2222", RevisionKind::Tag),
        );
        let err = configure(&services, &config, &RunOptions::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteConflict);
        assert!(err.recoverable);
        assert_eq!(err.failed_components(), vec!["web"]);
    }

    #[tokio::test]
    async fn test_unresolvable_revision_is_configuration_error() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();
        let mut inspector = MockBranchInspector::new();
        inspector
            .expect_resolve()
            .returning(|_, revision| Err(RemoteError::not_found("revision", revision)));
        let stage = ConfigureStage::new(services.registries(), Arc::new(inspector));
        let context = PersistedContext::new(config.directory(), config.signature());
        let options = RunOptions::new();
        let token = CancellationToken::new();
        let ctx = StageContext {
            context: &context,
            config: &config,
            options: &options,
            policy: options.rebuild_mode,
            cancellation: &token,
        };

        let err = stage.execute(&ctx).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::Configuration);
        assert!(err.message.contains("cannot resolve revision"));
    }

    #[tokio::test]
    async fn test_skip_branch_check_never_resolves() {
        let services = FakeServices::new();
        let config = sample_config("/configs/widget").unwrap();
        let mut inspector = MockBranchInspector::new();
        inspector.expect_resolve().never();
        let stage = ConfigureStage::new(services.registries(), Arc::new(inspector));
        let context = PersistedContext::new(config.directory(), config.signature());
        let options = RunOptions {
            skip_branch_check: true,
            ..RunOptions::default()
        };
        let token = CancellationToken::new();
        let ctx = StageContext {
            context: &context,
            config: &config,
            options: &options,
            policy: options.rebuild_mode,
            cancellation: &token,
        };

        let delta = stage.execute(&ctx).await.unwrap();

        let import = delta.import_result.unwrap();
        assert!(import.components.values().all(|c| c.commit.is_none() && !c.modified));
    }

    #[test]
    fn test_milestone_number() {
        assert_eq!(milestone_number("CR12", "CR"), Some(12));
        assert_eq!(milestone_number("ER1", "CR"), None);
        assert_eq!(milestone_number("CR", "CR"), None);
    }
}
