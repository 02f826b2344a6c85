//! The `release.toml` configuration file.

use crate::errors::ConfigError;
use crate::utils::{dependency_digest, dependency_order, sha256_hex, validate_component_graph};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside a configuration directory.
pub const CONFIG_FILE_NAME: &str = "release.toml";

const VERSION_PATTERN: &str = r"^\d+\.\d+(\.\d+)?$";
const MILESTONE_PATTERN: &str = r"^[A-Za-z]+(\d+|\*)$";

/// Product being released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    /// Product name.
    pub name: String,
    /// Short name used in release directory names.
    pub abbreviation: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// One component of the build group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    /// Component name, unique within the group.
    pub name: String,
    /// Source project name.
    pub project: String,
    /// Source repository URL.
    pub scm_url: String,
    /// Branch, tag or commit to build.
    pub revision: String,
    /// Build command.
    pub build_script: String,
    /// Names of other components this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ComponentConfig {
    /// Digest of the declared dependency set.
    #[must_use]
    pub fn dependency_digest(&self) -> String {
        dependency_digest(&self.dependencies)
    }
}

/// Pipeline behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    /// Fail the add-ons stage when a hook fails.
    pub fail_on_addon_error: bool,
    /// Interval between build status polls.
    pub poll_interval_ms: u64,
    /// Output directory, relative to the configuration directory.
    pub target_dir: PathBuf,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            fail_on_addon_error: false,
            poll_interval_ms: 10_000,
            target_dir: PathBuf::from("target"),
        }
    }
}

/// A validated release configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// The product.
    pub product: ProductConfig,
    /// Product version, `major.minor[.micro]`.
    pub version: String,
    /// Milestone name; a trailing `*` picks the next free number.
    pub milestone: String,
    /// Build group name.
    pub group: String,
    /// Components of the build group.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    /// Parameters of registered add-ons, keyed by add-on name.
    #[serde(default)]
    pub addons: BTreeMap<String, serde_json::Value>,
    /// Pipeline behaviour.
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(skip)]
    directory: PathBuf,
    #[serde(skip)]
    signature: String,
}

impl ReleaseConfig {
    /// Loads and validates `release.toml` from a configuration directory.
    ///
    /// The directory is canonicalized, so every spelling of the same
    /// directory binds to the same persisted context.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file is missing, unreadable or invalid.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = directory.as_ref().join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Err(ConfigError::Missing { path });
        }
        let directory = std::fs::canonicalize(directory.as_ref()).map_err(|err| ConfigError::Io {
            path: directory.as_ref().to_path_buf(),
            message: err.to_string(),
        })?;
        let content = std::fs::read_to_string(&path).map_err(|err| ConfigError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&content, directory)
    }

    /// Parses and validates a configuration bound to `directory`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the content is not valid.
    pub fn from_toml_str(content: &str, directory: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let directory = directory.into();
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse {
            path: directory.join(CONFIG_FILE_NAME),
            message: err.to_string(),
        })?;
        config.directory = directory;
        config.signature = sha256_hex(content);
        config.validate()?;
        Ok(config)
    }

    /// Validates names, syntax and the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("product.name", &self.product.name)?;
        require_non_empty("product.abbreviation", &self.product.abbreviation)?;
        require_non_empty("group", &self.group)?;
        require_match("version", &self.version, VERSION_PATTERN)?;
        require_match("milestone", &self.milestone, MILESTONE_PATTERN)?;

        if self.components.is_empty() {
            return Err(ConfigError::invalid("components", "at least one component is required"));
        }
        let mut seen = BTreeSet::new();
        for component in &self.components {
            require_non_empty("components.name", &component.name)?;
            require_non_empty(&format!("components.{}.project", component.name), &component.project)?;
            require_non_empty(&format!("components.{}.scm_url", component.name), &component.scm_url)?;
            require_non_empty(&format!("components.{}.revision", component.name), &component.revision)?;
            if !seen.insert(component.name.as_str()) {
                return Err(ConfigError::invalid(
                    "components.name",
                    format!("duplicate component '{}'", component.name),
                ));
            }
        }
        validate_component_graph(&self.dependency_graph())
    }

    fn dependency_graph(&self) -> BTreeMap<String, Vec<String>> {
        self.components
            .iter()
            .map(|c| (c.name.clone(), c.dependencies.clone()))
            .collect()
    }

    /// Returns components with dependencies before their dependents.
    #[must_use]
    pub fn build_order(&self) -> Vec<&ComponentConfig> {
        let order = dependency_order(&self.dependency_graph()).unwrap_or_default();
        order
            .iter()
            .filter_map(|name| self.component(name))
            .collect()
    }

    /// Returns a component by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }

    /// The configuration directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// SHA-256 of the configuration file content.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns true if the milestone requests auto-increment.
    #[must_use]
    pub fn is_milestone_auto(&self) -> bool {
        self.milestone.ends_with('*')
    }

    /// Milestone prefix without number or `*`, e.g. `CR`.
    #[must_use]
    pub fn milestone_prefix(&self) -> &str {
        self.milestone.trim_end_matches(|c: char| c == '*' || c.is_ascii_digit())
    }

    /// Output directory.
    #[must_use]
    pub fn target_dir(&self) -> PathBuf {
        if self.flow.target_dir.is_absolute() {
            self.flow.target_dir.clone()
        } else {
            self.directory.join(&self.flow.target_dir)
        }
    }

    /// Release directory name, `<abbreviation>-<full version>`.
    #[must_use]
    pub fn release_dir_name(&self, full_version: &str) -> String {
        format!("{}-{}", self.product.abbreviation, full_version)
    }

    /// Local release directory for a version.
    #[must_use]
    pub fn release_path(&self, full_version: &str) -> PathBuf {
        self.target_dir().join(self.release_dir_name(full_version))
    }

    /// Interval between build status polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.flow.poll_interval_ms)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn require_match(field: &str, value: &str, pattern: &str) -> Result<(), ConfigError> {
    let regex = Regex::new(pattern).map_err(|err| ConfigError::invalid(field, err.to_string()))?;
    if !regex.is_match(value) {
        return Err(ConfigError::invalid(
            field,
            format!("'{value}' does not match {pattern}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
version = "1.2.0"
milestone = "CR*"
group = "demo-1.2-all"

[product]
name = "Demo Product"
abbreviation = "demo"

[[components]]
name = "core"
project = "demo/core"
scm_url = "https://git.example.com/demo/core.git"
revision = "1.2.x"
build_script = "mvn deploy"

[[components]]
name = "web"
project = "demo/web"
scm_url = "https://git.example.com/demo/web.git"
revision = "v1.2.0"
build_script = "mvn deploy"
dependencies = ["core"]

[addons.notes]
channel = "releases"

[flow]
poll_interval_ms = 0
"#;

    #[test]
    fn test_parse_sample() {
        let config = ReleaseConfig::from_toml_str(SAMPLE, "/configs/demo").unwrap();

        assert_eq!(config.components.len(), 2);
        assert_eq!(config.signature(), sha256_hex(SAMPLE));
        assert!(config.is_milestone_auto());
        assert_eq!(config.milestone_prefix(), "CR");
        assert_eq!(config.target_dir(), PathBuf::from("/configs/demo/target"));
        assert_eq!(config.release_dir_name("1.2.0.CR1"), "demo-1.2.0.CR1");
        assert_eq!(config.poll_interval(), Duration::ZERO);
        assert!(!config.flow.fail_on_addon_error);
        assert_eq!(config.addons["notes"]["channel"], "releases");
    }

    #[test]
    fn test_build_order() {
        let config = ReleaseConfig::from_toml_str(SAMPLE, "/configs/demo").unwrap();
        let order: Vec<&str> = config.build_order().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["core", "web"]);
    }

    #[test]
    fn test_invalid_version() {
        let content = SAMPLE.replace("1.2.0", "1.x");
        let err = ReleaseConfig::from_toml_str(&content, "/c").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "version"));
    }

    #[test]
    fn test_invalid_milestone() {
        let content = SAMPLE.replace("CR*", "*");
        let err = ReleaseConfig::from_toml_str(&content, "/c").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "milestone"));
    }

    #[test]
    fn test_duplicate_component() {
        let content = SAMPLE.replace("name = \"web\"", "name = \"core\"");
        let err = ReleaseConfig::from_toml_str(&content, "/c").unwrap_err();
        assert!(err.to_string().contains("duplicate component 'core'"));
    }

    #[test]
    fn test_unknown_dependency() {
        let content = SAMPLE.replace("dependencies = [\"core\"]", "dependencies = [\"ghost\"]");
        let err = ReleaseConfig::from_toml_str(&content, "/c").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let content = format!("colour = \"red\"\n{SAMPLE}");
        let err = ReleaseConfig::from_toml_str(&content, "/c").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReleaseConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();
        let config = ReleaseConfig::load(dir.path()).unwrap();
        assert_eq!(config.directory(), std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_directory_spellings_bind_to_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();
        let name = dir.path().file_name().unwrap();

        let plain = ReleaseConfig::load(dir.path()).unwrap();
        let slashed = ReleaseConfig::load(format!("{}/", dir.path().display())).unwrap();
        let dotted = ReleaseConfig::load(dir.path().join(".")).unwrap();
        let parent = ReleaseConfig::load(dir.path().join("..").join(name)).unwrap();

        assert_eq!(slashed.directory(), plain.directory());
        assert_eq!(dotted.directory(), plain.directory());
        assert_eq!(parent.directory(), plain.directory());
        assert_eq!(plain.target_dir(), slashed.target_dir());
    }
}
