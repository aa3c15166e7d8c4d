//! Var-files: variable values supplied outside the main configuration.
//!
//! Two formats are understood:
//! - KDL (`*.vars.kdl`), one node per assignment: `region "eu-west-1"`
//! - JSON (`*.vars.json`), a single top-level object: `{"region": "eu-west-1"}`

use kdl::KdlDocument;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use varsmith_core::Value;

use crate::nodes::node_value;
use crate::{ConfigError, ConfigResult};

/// Values assigned by a single var-file, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct VarFile {
    pub path: PathBuf,
    pub assignments: Vec<(String, Value)>,
}

impl VarFile {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Whether `path` names a JSON var-file.
pub fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Read and parse a var-file, choosing the format by extension.
pub fn load_var_file(path: &Path) -> ConfigResult<VarFile> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loading var-file");

    let assignments = if is_json(path) {
        parse_json_assignments(&content)
    } else {
        parse_kdl_assignments(&content)
    };

    let assignments = assignments.map_err(|e| ConfigError::VarFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(VarFile {
        path: path.to_path_buf(),
        assignments,
    })
}

/// Parse KDL var-file content.
pub fn parse_kdl_assignments(kdl: &str) -> ConfigResult<Vec<(String, Value)>> {
    let doc: KdlDocument = kdl.parse()?;
    let mut assignments: Vec<(String, Value)> = Vec::new();

    for node in doc.nodes() {
        let name = node.name().value().to_string();
        if assignments.iter().any(|(n, _)| *n == name) {
            return Err(ConfigError::Duplicate(format!("assignment to '{name}'")));
        }
        if node.entries().iter().any(|e| e.name().is_some()) {
            return Err(ConfigError::InvalidValue {
                field: name,
                message: "var-file assignments take no properties".to_string(),
            });
        }
        let value = node_value(node)?;
        assignments.push((name, value));
    }

    Ok(assignments)
}

/// Top-level object of a JSON var-file, in file order and with any repeated
/// names kept so they can be reported.
struct JsonAssignments(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for JsonAssignments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(JsonAssignmentsVisitor)
    }
}

struct JsonAssignmentsVisitor;

impl<'de> Visitor<'de> for JsonAssignmentsVisitor {
    type Value = JsonAssignments;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object at the top level")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<JsonAssignments, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, Value>()? {
            entries.push(entry);
        }
        Ok(JsonAssignments(entries))
    }
}

/// Parse JSON var-file content.
pub fn parse_json_assignments(json: &str) -> ConfigResult<Vec<(String, Value)>> {
    let JsonAssignments(entries) =
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
            field: "var-file".to_string(),
            message: e.to_string(),
        })?;

    let mut assignments: Vec<(String, Value)> = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        if assignments.iter().any(|(n, _)| *n == name) {
            return Err(ConfigError::Duplicate(format!("assignment to '{name}'")));
        }
        assignments.push((name, value));
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_kdl_assignments() {
        let assignments = parse_kdl_assignments(
            r#"
            region "eu-west-1"
            zones "a" "b"
            tags {
                owner "ops"
            }
            "#,
        )
        .unwrap();

        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0], ("region".to_string(), Value::from("eu-west-1")));
        assert!(assignments[2].1.as_map().is_some());
    }

    #[test]
    fn test_duplicate_assignment() {
        let err = parse_kdl_assignments("a 1\na 2").unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_parse_json_assignments() {
        let assignments =
            parse_json_assignments(r#"{"region": "eu-west-1", "count": 2, "zones": ["a"]}"#)
                .unwrap();
        let file = VarFile {
            path: PathBuf::from("test.vars.json"),
            assignments,
        };
        assert_eq!(file.get("count"), Some(&Value::Number(2.0)));
        assert_eq!(file.get("zones"), Some(&Value::List(vec![Value::from("a")])));
    }

    #[test]
    fn test_json_must_be_object() {
        assert!(parse_json_assignments(r#"["a"]"#).is_err());
    }

    #[test]
    fn test_json_repeated_names_rejected() {
        let err = parse_json_assignments(r#"{"region": "a", "region": "b"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(ref what) if what == "assignment to 'region'"));

        let err = parse_json_assignments(r#"{"tags": {"a": 1, "a": 2}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_var_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let kdl_path = dir.path().join("prod.vars.kdl");
        let mut file = std::fs::File::create(&kdl_path).unwrap();
        writeln!(file, r#"region "us-west-2""#).unwrap();

        let json_path = dir.path().join("prod.vars.json");
        std::fs::write(&json_path, r#"{"region": "eu-central-1"}"#).unwrap();

        assert_eq!(
            load_var_file(&kdl_path).unwrap().get("region"),
            Some(&Value::from("us-west-2"))
        );
        assert_eq!(
            load_var_file(&json_path).unwrap().get("region"),
            Some(&Value::from("eu-central-1"))
        );
    }

    #[test]
    fn test_missing_var_file() {
        let err = load_var_file(Path::new("/nonexistent/x.vars.kdl")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
