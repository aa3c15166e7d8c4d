//! Helpers for reading values out of KDL nodes.
//!
//! Literal values (defaults, var-file assignments, literal locals) share one
//! grammar:
//! - one argument: a scalar, e.g. `region "us-east-1"`
//! - several arguments: a list, e.g. `zones "a" "b"`
//! - children all named `-`: a list of child values
//! - other children: a map keyed by child name
//! - no arguments and no children: an empty list

use kdl::{KdlEntry, KdlNode, KdlValue};
use std::collections::BTreeMap;
use varsmith_core::Value;

use crate::{ConfigError, ConfigResult};

pub fn kdl_to_value(value: &KdlValue) -> Value {
    match value {
        KdlValue::String(s) => Value::String(s.clone()),
        KdlValue::Integer(i) => Value::Number(*i as f64),
        KdlValue::Float(f) => Value::Number(*f),
        KdlValue::Bool(b) => Value::Bool(*b),
        KdlValue::Null => Value::Null,
    }
}

/// Positional arguments of a node, in order.
pub fn args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(KdlEntry::value)
}

/// Named properties of a node, in order.
pub fn props(node: &KdlNode) -> impl Iterator<Item = (&str, &KdlValue)> {
    node.entries()
        .iter()
        .filter_map(|e| e.name().map(|n| (n.value(), e.value())))
}

pub fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    args(node)
        .next()
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub fn get_bool_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<bool>> {
    match node.get(name) {
        None => Ok(None),
        Some(KdlValue::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ConfigError::InvalidValue {
            field: format!("{} {name}", node.name().value()),
            message: format!("expected #true or #false, found {other}"),
        }),
    }
}

/// Read the literal value carried by a node's arguments and children.
/// Properties are ignored.
pub fn node_value(node: &KdlNode) -> ConfigResult<Value> {
    let positional: Vec<&KdlValue> = args(node).collect();
    let children = node.children().map(|doc| doc.nodes()).unwrap_or_default();

    if !positional.is_empty() && !children.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: node.name().value().to_string(),
            message: "a value cannot have both arguments and children".to_string(),
        });
    }

    match positional.as_slice() {
        [single] => return Ok(kdl_to_value(single)),
        [] => {}
        many => return Ok(Value::List(many.iter().map(|v| kdl_to_value(v)).collect())),
    }

    if children.is_empty() {
        return Ok(Value::List(vec![]));
    }

    if children.iter().all(|c| c.name().value() == "-") {
        return children
            .iter()
            .map(node_value)
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::List);
    }

    let mut entries = BTreeMap::new();
    for child in children {
        let key = child.name().value().to_string();
        if key == "-" {
            return Err(ConfigError::InvalidValue {
                field: node.name().value().to_string(),
                message: "cannot mix list items ('-') with map keys".to_string(),
            });
        }
        if entries.contains_key(&key) {
            return Err(ConfigError::Duplicate(format!(
                "key '{}' in {}",
                key,
                node.name().value()
            )));
        }
        entries.insert(key, node_value(child)?);
    }
    Ok(Value::Map(entries))
}
