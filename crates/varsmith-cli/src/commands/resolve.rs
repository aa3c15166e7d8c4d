//! Resolve command: print every variable and local as JSON.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use varsmith_config::Mode;
use varsmith_core::Value;

use super::{SENSITIVE, redacted};
use crate::VarArgs;

#[derive(Debug, Default, Serialize)]
struct Output {
    var: BTreeMap<String, serde_json::Value>,
    local: BTreeMap<String, serde_json::Value>,
}

pub fn run(args: &VarArgs, show_sensitive: bool) -> Result<()> {
    let (_project, resolved) = super::load_and_resolve(args, Mode::Strict)?;

    let redact = |value: &Value, sensitive: bool| redacted(value, sensitive) && !show_sensitive;
    let mut output = Output::default();

    for variable in &resolved.variables {
        let value = if redact(&variable.value, variable.sensitive) {
            serde_json::Value::String(SENSITIVE.to_string())
        } else {
            serde_json::to_value(&variable.value)?
        };
        output.var.insert(variable.name.clone(), value);
    }
    for local in &resolved.locals {
        let value = if redact(&local.value, local.sensitive) {
            serde_json::Value::String(SENSITIVE.to_string())
        } else {
            serde_json::to_value(&local.value)?
        };
        output.local.insert(local.name.clone(), value);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
