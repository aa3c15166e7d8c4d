//! Declared variable types.

use derive_more::Display;
use std::str::FromStr;

use crate::{Error, Result, Value};

/// The static type of an input variable, e.g. `list(string)`.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum VarType {
    #[display("string")]
    String,
    #[display("number")]
    Number,
    #[display("bool")]
    Bool,
    #[display("list({_0})")]
    List(Box<VarType>),
    #[display("map({_0})")]
    Map(Box<VarType>),
    #[display("any")]
    Any,
}

impl VarType {
    pub fn list(element: VarType) -> Self {
        VarType::List(Box::new(element))
    }

    pub fn map(element: VarType) -> Self {
        VarType::Map(Box::new(element))
    }

    /// Infer the type of a literal, used when a variable has a default but no
    /// declared type.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::String(_) => VarType::String,
            Value::Number(_) => VarType::Number,
            Value::Bool(_) => VarType::Bool,
            Value::List(items) => VarType::list(common_type(items.iter())),
            Value::Map(entries) => VarType::map(common_type(entries.values())),
            Value::Null | Value::Unknown => VarType::Any,
        }
    }
}

fn common_type<'a>(mut values: impl Iterator<Item = &'a Value>) -> VarType {
    let Some(first) = values.next() else {
        return VarType::Any;
    };
    let ty = VarType::infer(first);
    if values.all(|v| VarType::infer(v) == ty) {
        ty
    } else {
        VarType::Any
    }
}

fn strip_wrapper<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    input
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

impl FromStr for VarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed {
            "string" => return Ok(VarType::String),
            "number" => return Ok(VarType::Number),
            "bool" => return Ok(VarType::Bool),
            "any" => return Ok(VarType::Any),
            "list" => return Ok(VarType::list(VarType::Any)),
            "map" => return Ok(VarType::map(VarType::Any)),
            _ => {}
        }

        if let Some(inner) = strip_wrapper(trimmed, "list") {
            return Ok(VarType::list(inner.parse().map_err(|e| nested(s, e))?));
        }
        if let Some(inner) = strip_wrapper(trimmed, "map") {
            return Ok(VarType::map(inner.parse().map_err(|e| nested(s, e))?));
        }

        Err(Error::InvalidType {
            input: s.to_string(),
            message: "expected string, number, bool, any, list(T) or map(T)".to_string(),
        })
    }
}

fn nested(outer: &str, inner: Error) -> Error {
    match inner {
        Error::InvalidType { message, .. } => Error::InvalidType {
            input: outer.to_string(),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_scalars() {
        assert_eq!("string".parse::<VarType>().unwrap(), VarType::String);
        assert_eq!(" number ".parse::<VarType>().unwrap(), VarType::Number);
        assert_eq!("bool".parse::<VarType>().unwrap(), VarType::Bool);
    }

    #[test]
    fn test_parse_collections() {
        assert_eq!(
            "list(string)".parse::<VarType>().unwrap(),
            VarType::list(VarType::String)
        );
        assert_eq!(
            "map( list(number) )".parse::<VarType>().unwrap(),
            VarType::map(VarType::list(VarType::Number))
        );
        assert_eq!("list".parse::<VarType>().unwrap(), VarType::list(VarType::Any));
    }

    #[test]
    fn test_parse_invalid() {
        let err = "list(strng)".parse::<VarType>().unwrap_err();
        assert!(matches!(err, Error::InvalidType { ref input, .. } if input == "list(strng)"));
        assert!("object".parse::<VarType>().is_err());
        assert!("list(string".parse::<VarType>().is_err());
    }

    #[test]
    fn test_display_roundtrips_syntax() {
        let ty = VarType::map(VarType::list(VarType::String));
        assert_eq!(ty.to_string(), "map(list(string))");
    }

    #[test]
    fn test_infer() {
        let mixed = Value::List(vec![Value::from("a"), Value::from(1i64)]);
        assert_eq!(VarType::infer(&mixed), VarType::list(VarType::Any));

        let mut tags = BTreeMap::new();
        tags.insert("a".to_string(), Value::from("x"));
        assert_eq!(
            VarType::infer(&Value::Map(tags)),
            VarType::map(VarType::String)
        );
    }
}
