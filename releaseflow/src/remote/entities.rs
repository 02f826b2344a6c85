//! Remote entities registered by Configure and their CRUD contract.

use super::RemoteError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Kinds of entities held by the remote registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// A product.
    Product,
    /// A version of a product.
    ProductVersion,
    /// A milestone of a product version.
    Milestone,
    /// A source project.
    Project,
    /// A component build configuration.
    BuildConfig,
    /// A build group configuration.
    GroupConfig,
}

impl EntityKind {
    /// Returns the REST collection path segment.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::ProductVersion => "product-versions",
            Self::Milestone => "product-milestones",
            Self::Project => "projects",
            Self::BuildConfig => "build-configs",
            Self::GroupConfig => "group-configs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::ProductVersion => write!(f, "product version"),
            Self::Milestone => write!(f, "milestone"),
            Self::Project => write!(f, "project"),
            Self::BuildConfig => write!(f, "build config"),
            Self::GroupConfig => write!(f, "group config"),
        }
    }
}

/// Field-equality filter used by `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Field name to expected value.
    pub fields: BTreeMap<String, String>,
}

impl EntityQuery {
    /// Creates a query matching everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// An entity stored in the remote registry, addressed by an opaque id.
pub trait RemoteEntity:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The entity kind.
    const KIND: EntityKind;

    /// Returns the id; empty before the entity is created.
    fn id(&self) -> &str;

    /// Returns the entity with the given id assigned.
    #[must_use]
    fn with_id(self, id: String) -> Self;

    /// Returns true if every field of the query equals the serialised field.
    fn matches(&self, query: &EntityQuery) -> bool {
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return false;
        };
        query.fields.iter().all(|(name, expected)| match fields.get(name) {
            Some(serde_json::Value::String(actual)) => actual == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        })
    }
}

/// Generic CRUD capability over one entity kind.
#[async_trait]
pub trait EntityRegistry<E: RemoteEntity>: Send + Sync {
    /// Creates the entity and returns it with its assigned id.
    async fn create(&self, entity: E) -> Result<E, RemoteError>;

    /// Fetches an entity by id.
    async fn get(&self, id: &str) -> Result<Option<E>, RemoteError>;

    /// Lists entities matching the query.
    async fn list(&self, query: &EntityQuery) -> Result<Vec<E>, RemoteError>;

    /// Replaces an existing entity.
    async fn update(&self, entity: E) -> Result<E, RemoteError>;

    /// Returns the first entity matching the query.
    async fn find_one(&self, query: &EntityQuery) -> Result<Option<E>, RemoteError> {
        Ok(self.list(query).await?.into_iter().next())
    }
}

macro_rules! remote_entity {
    ($ty:ty, $kind:expr) => {
        impl RemoteEntity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn with_id(mut self, id: String) -> Self {
                self.id = id;
                self
            }
        }
    };
}

/// A product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Product name.
    pub name: String,
    /// Short name used in release directory names.
    pub abbreviation: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// A product version, e.g. `1.2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Owning product id.
    pub product_id: String,
    /// Version string.
    pub version: String,
}

/// A milestone of a product version, e.g. `CR1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Owning product version id.
    pub version_id: String,
    /// Milestone name.
    pub name: String,
    /// Full version, `<version>.<name>`.
    pub full_version: String,
    /// Whether the milestone was closed by a release.
    #[serde(default)]
    pub closed: bool,
}

/// A source project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Project name.
    pub name: String,
}

/// Build configuration of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Component name.
    pub name: String,
    /// Owning project id.
    pub project_id: String,
    /// Source repository URL.
    pub scm_url: String,
    /// Branch, tag or commit to build.
    pub revision: String,
    /// Build command.
    pub build_script: String,
    /// Names of in-group dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Commit recorded the last time the revision was checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_commit: Option<String>,
}

/// Build group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Remote id.
    #[serde(default)]
    pub id: String,
    /// Group name.
    pub name: String,
    /// Product version id.
    pub version_id: String,
    /// Member build configuration ids.
    #[serde(default)]
    pub build_config_ids: Vec<String>,
}

remote_entity!(Product, EntityKind::Product);
remote_entity!(ProductVersion, EntityKind::ProductVersion);
remote_entity!(Milestone, EntityKind::Milestone);
remote_entity!(Project, EntityKind::Project);
remote_entity!(BuildConfig, EntityKind::BuildConfig);
remote_entity!(GroupConfig, EntityKind::GroupConfig);

/// One registry per entity kind.
#[derive(Clone)]
pub struct EntityRegistries {
    /// Products.
    pub products: Arc<dyn EntityRegistry<Product>>,
    /// Product versions.
    pub versions: Arc<dyn EntityRegistry<ProductVersion>>,
    /// Milestones.
    pub milestones: Arc<dyn EntityRegistry<Milestone>>,
    /// Projects.
    pub projects: Arc<dyn EntityRegistry<Project>>,
    /// Build configurations.
    pub build_configs: Arc<dyn EntityRegistry<BuildConfig>>,
    /// Group configurations.
    pub group_configs: Arc<dyn EntityRegistry<GroupConfig>>,
}

impl Debug for EntityRegistries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistries").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BuildConfig {
        BuildConfig {
            id: "7".to_string(),
            name: "core".to_string(),
            project_id: "p1".to_string(),
            scm_url: "https://git.example.com/core.git".to_string(),
            revision: "main".to_string(),
            build_script: "mvn deploy".to_string(),
            dependencies: vec![],
            recorded_commit: None,
        }
    }

    #[test]
    fn test_query_matches_string_fields() {
        let config = config();
        assert!(config.matches(&EntityQuery::all()));
        assert!(config.matches(&EntityQuery::all().eq("name", "core")));
        assert!(!config.matches(&EntityQuery::all().eq("name", "api")));
        assert!(!config.matches(&EntityQuery::all().eq("missing", "x")));
    }

    #[test]
    fn test_query_matches_non_string_fields() {
        let milestone = Milestone {
            id: String::new(),
            version_id: "v".to_string(),
            name: "CR1".to_string(),
            full_version: "1.0.CR1".to_string(),
            closed: true,
        };
        assert!(milestone.matches(&EntityQuery::all().eq("closed", "true")));
    }

    #[test]
    fn test_with_id() {
        let config = config().with_id("42".to_string());
        assert_eq!(config.id(), "42");
        assert_eq!(BuildConfig::KIND.path(), "build-configs");
    }
}
