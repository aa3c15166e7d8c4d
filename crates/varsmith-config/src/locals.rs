//! Local evaluation in dependency order.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use varsmith_core::Value;

use crate::declaration::{Config, Local, local_dependencies};
use crate::expression::{self, RefKind, Scope};
use crate::{ConfigError, ConfigResult};

/// A local after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedLocal {
    pub name: String,
    pub value: Value,
    /// Declared sensitive, or derived from a sensitive variable or local.
    pub sensitive: bool,
}

/// Check that every reference made by a local names a declared variable or local.
pub fn check_references(config: &Config) -> ConfigResult<()> {
    for local in &config.locals {
        for reference in local.references() {
            let declared = match reference.kind {
                RefKind::Variable => config.variable(&reference.name).is_some(),
                RefKind::Local => config.local(&reference.name).is_some(),
            };
            if !declared {
                return Err(ConfigError::InvalidReference(format!(
                    "local '{}' references undeclared {}",
                    local.name, reference
                )));
            }
        }
    }
    Ok(())
}

/// Order locals so that every local comes after the locals it references.
pub fn evaluation_order(locals: &[Local]) -> ConfigResult<Vec<String>> {
    if let Err(cycle) = detect_cycle(locals) {
        return Err(ConfigError::CycleDetected(cycle));
    }
    Ok(topological_sort(locals))
}

/// Detect cycles in the local dependency graph using DFS.
/// On failure returns the cycle as `a -> b -> a`.
fn detect_cycle(locals: &[Local]) -> Result<(), String> {
    let deps: HashMap<&str, Vec<String>> = locals
        .iter()
        .map(|l| (l.name.as_str(), local_dependencies(l)))
        .collect();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();

    for local in locals {
        if !visited.contains(local.name.as_str()) {
            if let Some(cycle) = dfs_detect_cycle(&local.name, &deps, &mut visited, &mut stack) {
                return Err(cycle);
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle<'a>(
    node: &'a str,
    deps: &'a HashMap<&'a str, Vec<String>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<String> {
    visited.insert(node);
    stack.push(node);

    if let Some(node_deps) = deps.get(node) {
        for dep in node_deps {
            let dep_str: &'a str = dep.as_str();
            if let Some(start) = stack.iter().position(|n| *n == dep_str) {
                let mut path: Vec<&str> = stack[start..].to_vec();
                path.push(dep_str);
                return Some(path.join(" -> "));
            }
            if !visited.contains(dep_str) {
                if let Some(cycle) = dfs_detect_cycle(dep_str, deps, visited, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    None
}

fn topological_sort(locals: &[Local]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let local_map: HashMap<&str, &Local> = locals.iter().map(|l| (l.name.as_str(), l)).collect();

    for local in locals {
        topo_visit(&local.name, &local_map, &mut visited, &mut result);
    }

    result
}

fn topo_visit(
    name: &str,
    local_map: &HashMap<&str, &Local>,
    visited: &mut HashSet<String>,
    result: &mut Vec<String>,
) {
    if !visited.insert(name.to_string()) {
        return;
    }

    if let Some(local) = local_map.get(name) {
        for dep in local_dependencies(local) {
            topo_visit(&dep, local_map, visited, result);
        }
    }

    result.push(name.to_string());
}

/// Evaluate every local of `config` against resolved variable values.
///
/// `sensitive_variables` names the variables whose values must not leak; any
/// local derived from them is marked sensitive. Results are returned in
/// declaration order.
pub fn evaluate_locals(
    config: &Config,
    variables: &BTreeMap<String, Value>,
    sensitive_variables: &HashSet<String>,
) -> ConfigResult<Vec<EvaluatedLocal>> {
    check_references(config)?;
    let order = evaluation_order(&config.locals)?;
    debug!(order = ?order, "evaluating locals");

    let mut values: BTreeMap<String, Value> = BTreeMap::new();
    let mut sensitive: HashSet<String> = HashSet::new();

    for name in &order {
        let Some(local) = config.local(name) else {
            continue;
        };

        let value = {
            let scope = Scope::new(variables, &values);
            expression::evaluate(&local.expr, &scope).map_err(|source| {
                ConfigError::Expression {
                    context: format!("local '{name}'"),
                    source,
                }
            })?
        };

        let derived_sensitive = local.references().iter().any(|r| match r.kind {
            RefKind::Variable => sensitive_variables.contains(&r.name),
            RefKind::Local => sensitive.contains(&r.name),
        });
        if local.sensitive || derived_sensitive {
            sensitive.insert(name.clone());
        }

        values.insert(name.clone(), value);
    }

    Ok(config
        .locals
        .iter()
        .map(|local| EvaluatedLocal {
            name: local.name.clone(),
            value: values.remove(&local.name).unwrap_or(Value::Unknown),
            sensitive: sensitive.contains(&local.name),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::parse_config;

    fn vars(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_forward_references_resolve() {
        let config = parse_config(
            r#"
            variable "region" default="us-east-1"
            locals {
                full_name "${local.prefix}-${var.region}"
                prefix "build"
            }
            "#,
        )
        .unwrap();

        let locals = evaluate_locals(
            &config,
            &vars(&[("region", Value::from("us-east-1"))]),
            &HashSet::new(),
        )
        .unwrap();

        assert_eq!(locals[0].name, "full_name");
        assert_eq!(locals[0].value, Value::from("build-us-east-1"));
        assert_eq!(locals[1].value, Value::from("build"));
    }

    #[test]
    fn test_topological_order() {
        let config = parse_config(
            r#"
            locals {
                c expr="local.b"
                b expr="local.a"
                a 1
            }
            "#,
        )
        .unwrap();

        let order = evaluation_order(&config.locals).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_detected() {
        let config = parse_config(
            r#"
            locals {
                a expr="local.b"
                b expr="local.c"
                c expr="local.a"
            }
            "#,
        )
        .unwrap();

        let err = evaluation_order(&config.locals).unwrap_err();
        match err {
            ConfigError::CycleDetected(path) => assert_eq!(path, "a -> b -> c -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let config = parse_config(r#"local "a" expr="local.a + 1""#).unwrap();
        assert!(matches!(
            evaluation_order(&config.locals).unwrap_err(),
            ConfigError::CycleDetected(_)
        ));
    }

    #[test]
    fn test_undeclared_reference() {
        let config = parse_config(r#"local "a" "${var.missing}""#).unwrap();
        let err = evaluate_locals(&config, &BTreeMap::new(), &HashSet::new()).unwrap_err();
        assert!(err.to_string().contains("undeclared var.missing"));
    }

    #[test]
    fn test_unknown_propagates() {
        let config = parse_config(
            r#"
            variable "region"
            locals {
                bucket "${var.region}-artifacts"
                upper_bucket expr="upper(local.bucket)"
                fixed "static"
            }
            "#,
        )
        .unwrap();

        let locals = evaluate_locals(
            &config,
            &vars(&[("region", Value::Unknown)]),
            &HashSet::new(),
        )
        .unwrap();

        assert_eq!(locals[0].value, Value::Unknown);
        assert_eq!(locals[1].value, Value::Unknown);
        assert_eq!(locals[2].value, Value::from("static"));
    }

    #[test]
    fn test_sensitivity_propagates() {
        let config = parse_config(
            r#"
            variable "password" sensitive=#true
            locals {
                url "https://admin:${var.password}@db"
                banner expr="upper(local.url)"
                host "db"
            }
            "#,
        )
        .unwrap();

        let sensitive: HashSet<String> = ["password".to_string()].into_iter().collect();
        let locals = evaluate_locals(
            &config,
            &vars(&[("password", Value::from("hunter2"))]),
            &sensitive,
        )
        .unwrap();

        assert!(locals[0].sensitive);
        assert!(locals[1].sensitive);
        assert!(!locals[2].sensitive);
    }
}
