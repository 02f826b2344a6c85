//! Validation of the component dependency graph.

use crate::errors::ConfigError;
use std::collections::{BTreeMap, BTreeSet};

/// Checks that every dependency is known and the graph has no cycle.
///
/// # Errors
///
/// Returns `ConfigError::UnknownDependency` or `ConfigError::CycleDetected`.
pub fn validate_component_graph<S: AsRef<str>>(
    components: &BTreeMap<String, Vec<S>>,
) -> Result<(), ConfigError> {
    for (name, deps) in components {
        for dep in deps {
            if !components.contains_key(dep.as_ref()) {
                return Err(ConfigError::UnknownDependency {
                    component: name.clone(),
                    dependency: dep.as_ref().to_string(),
                });
            }
        }
    }
    dependency_order(components).map(|_| ())
}

/// Returns component names with dependencies before their dependents.
///
/// Unknown dependency names are ignored.
///
/// # Errors
///
/// Returns `ConfigError::CycleDetected` with the cycle path.
pub fn dependency_order<S: AsRef<str>>(
    components: &BTreeMap<String, Vec<S>>,
) -> Result<Vec<String>, ConfigError> {
    fn dfs<S: AsRef<str>>(
        node: &str,
        components: &BTreeMap<String, Vec<S>>,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        if let Some(start) = path.iter().position(|n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Err(cycle);
        }
        if visited.contains(node) {
            return Ok(());
        }
        let Some(deps) = components.get(node) else {
            return Ok(());
        };

        path.push(node.to_string());
        for dep in deps {
            dfs(dep.as_ref(), components, visited, path, order)?;
        }
        path.pop();
        visited.insert(node.to_string());
        order.push(node.to_string());
        Ok(())
    }

    let mut visited = BTreeSet::new();
    let mut order = Vec::with_capacity(components.len());
    let mut path = Vec::new();
    for node in components.keys() {
        dfs(node, components, &mut visited, &mut path, &mut order)
            .map_err(|cycle| ConfigError::CycleDetected { cycle })?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_string(),
                    deps.iter().map(|d| (*d).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_order_puts_dependencies_first() {
        let order = dependency_order(&graph(&[("web", &["api"]), ("api", &["core"]), ("core", &[])]))
            .unwrap();
        assert_eq!(order, vec!["core", "api", "web"]);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let err = validate_component_graph(&graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::CycleDetected {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = validate_component_graph(&graph(&[("a", &["a"])])).unwrap_err();
        assert!(matches!(err, ConfigError::CycleDetected { .. }));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = validate_component_graph(&graph(&[("a", &["ghost"])])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownDependency {
                component: "a".into(),
                dependency: "ghost".into()
            }
        );
    }
}
