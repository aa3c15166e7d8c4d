//! Conversion of untyped text input (command-line flags, environment) into
//! typed values.

use std::collections::BTreeMap;
use thiserror::Error;
use varsmith_core::{Value, VarType, coerce};

use crate::expression::{self, ExprError, Scope};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RawValueError {
    #[error(transparent)]
    Syntax(#[from] ExprError),

    #[error(transparent)]
    Type(#[from] varsmith_core::Error),
}

/// Interpret raw text as a value of type `ty`.
///
/// Strings (and untyped variables) take the text verbatim. Numbers and bools
/// parse the trimmed text. Lists and maps parse the text as a literal, e.g.
/// `["a", "b"]` or `{ owner = "ops" }`.
pub fn coerce_raw(text: &str, ty: &VarType) -> Result<Value, RawValueError> {
    match ty {
        VarType::String | VarType::Any => Ok(Value::String(text.to_string())),
        VarType::Number | VarType::Bool => Ok(coerce(Value::String(text.trim().to_string()), ty)?),
        VarType::List(_) | VarType::Map(_) => {
            let expr = expression::parse(text)?;
            let empty = BTreeMap::new();
            let value = expression::evaluate(&expr, &Scope::new(&empty, &empty))?;
            Ok(coerce(value, ty)?)
        }
    }
}
