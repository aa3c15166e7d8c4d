//! Coercion of values into declared variable types.

use std::collections::BTreeMap;

use crate::value::format_number;
use crate::{Error, Result, Value, VarType};

/// Convert `value` into `ty`, converting scalars where the conversion is
/// lossless (e.g. `"42"` to a number) and recursing into collections.
///
/// `Null` and `Unknown` are accepted by every type.
pub fn coerce(value: Value, ty: &VarType) -> Result<Value> {
    coerce_at(value, ty, "")
}

fn coerce_at(value: Value, ty: &VarType, path: &str) -> Result<Value> {
    if value.is_null() || value.is_unknown() {
        return Ok(value);
    }

    match (ty, value) {
        (VarType::Any, value) => Ok(value),

        (VarType::String, Value::String(s)) => Ok(Value::String(s)),
        (VarType::String, Value::Number(n)) => Ok(Value::String(format_number(n))),
        (VarType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (VarType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (VarType::Number, Value::String(s)) => match parse_number(&s) {
            Some(n) => Ok(Value::Number(n)),
            None => Err(mismatch(path, ty, &format!("string \"{s}\""))),
        },

        (VarType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (VarType::Bool, Value::String(s)) => match parse_bool(&s) {
            Some(b) => Ok(Value::Bool(b)),
            None => Err(mismatch(path, ty, &format!("string \"{s}\""))),
        },

        (VarType::List(element), Value::List(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| coerce_at(item, element, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (VarType::List(_), Value::Map(entries)) if entries.is_empty() => Ok(Value::List(vec![])),

        (VarType::Map(element), Value::Map(entries)) => entries
            .into_iter()
            .map(|(key, item)| {
                let child = format!("{path}.{key}");
                coerce_at(item, element, &child).map(|v| (key, v))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map),

        (ty, value) => Err(mismatch(path, ty, value.kind())),
    }
}

/// Parse a number the way untyped input is interpreted.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a bool the way untyped input is interpreted.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn mismatch(path: &str, expected: &VarType, found: &str) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(
            coerce(Value::from(8i64), &VarType::String).unwrap(),
            Value::from("8")
        );
        assert_eq!(
            coerce(Value::from(" 2.5"), &VarType::Number).unwrap(),
            Value::Number(2.5)
        );
        assert_eq!(
            coerce(Value::from("true"), &VarType::Bool).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_rejects_non_numeric_string() {
        let err = coerce(Value::from("eight"), &VarType::Number).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot convert string \"eight\" to number"
        );
    }

    #[test]
    fn test_list_elements_report_path() {
        let value = Value::List(vec![Value::from(1i64), Value::from("x"), Value::from(true)]);
        let err = coerce(value, &VarType::list(VarType::Number)).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert string \"x\" to number at [1]");
    }

    #[test]
    fn test_map_values_coerced() {
        let mut entries = BTreeMap::new();
        entries.insert("port".to_string(), Value::from("8080"));
        let coerced = coerce(Value::Map(entries), &VarType::map(VarType::Number)).unwrap();
        assert_eq!(coerced.as_map().unwrap()["port"], Value::Number(8080.0));
    }

    #[test]
    fn test_nested_map_path() {
        let mut inner = BTreeMap::new();
        inner.insert("owner".to_string(), Value::List(vec![]));
        let mut outer = BTreeMap::new();
        outer.insert("tags".to_string(), Value::Map(inner));

        let ty = VarType::map(VarType::map(VarType::String));
        let err = coerce(Value::Map(outer), &ty).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert list to string at .tags.owner");
    }

    #[test]
    fn test_empty_map_is_empty_list() {
        let coerced = coerce(Value::Map(BTreeMap::new()), &VarType::list(VarType::String)).unwrap();
        assert_eq!(coerced, Value::List(vec![]));
    }

    #[test]
    fn test_unknown_and_null_pass_through() {
        assert_eq!(
            coerce(Value::Unknown, &VarType::list(VarType::Bool)).unwrap(),
            Value::Unknown
        );
        assert_eq!(coerce(Value::Null, &VarType::Number).unwrap(), Value::Null);
    }

    #[test]
    fn test_list_is_not_a_string() {
        assert!(coerce(Value::List(vec![]), &VarType::String).is_err());
        assert!(coerce(Value::from(1i64), &VarType::Bool).is_err());
    }
}
