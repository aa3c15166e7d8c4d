//! Inspect command: show every variable and local with its value and origin.

use anyhow::Result;
use serde::Serialize;
use varsmith_config::Mode;
use varsmith_core::Value;

use super::{SENSITIVE, redacted};
use crate::{OutputFormat, VarArgs};

#[derive(Debug, Serialize)]
struct VariableReport {
    name: String,
    #[serde(rename = "type")]
    var_type: String,
    value: serde_json::Value,
    source: String,
    sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct LocalReport {
    name: String,
    value: serde_json::Value,
    sensitive: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    variables: Vec<VariableReport>,
    locals: Vec<LocalReport>,
}

fn shown(value: &Value, sensitive: bool) -> String {
    if redacted(value, sensitive) {
        SENSITIVE.to_string()
    } else {
        value.to_string()
    }
}

fn shown_json(value: &Value, sensitive: bool) -> Result<serde_json::Value> {
    if redacted(value, sensitive) {
        Ok(serde_json::Value::String(SENSITIVE.to_string()))
    } else {
        Ok(serde_json::to_value(value)?)
    }
}

pub fn run(args: &VarArgs, format: OutputFormat) -> Result<()> {
    let (_project, resolved) = super::load_and_resolve(args, Mode::Lenient)?;

    match format {
        OutputFormat::Text => {
            println!("> input-variables:");
            println!();
            for variable in &resolved.variables {
                println!(
                    "var.{}: {} ({}, {})",
                    variable.name,
                    shown(&variable.value, variable.sensitive),
                    variable.var_type,
                    variable.source
                );
                if let Some(description) = &variable.description {
                    println!("    {description}");
                }
            }
            println!();
            println!("> local-variables:");
            println!();
            for local in &resolved.locals {
                println!("local.{}: {}", local.name, shown(&local.value, local.sensitive));
            }
        }
        OutputFormat::Json => {
            let mut report = Report {
                variables: Vec::new(),
                locals: Vec::new(),
            };
            for variable in &resolved.variables {
                report.variables.push(VariableReport {
                    name: variable.name.clone(),
                    var_type: variable.var_type.to_string(),
                    value: shown_json(&variable.value, variable.sensitive)?,
                    source: variable.source.to_string(),
                    sensitive: variable.sensitive,
                    description: variable.description.clone(),
                });
            }
            for local in &resolved.locals {
                report.locals.push(LocalReport {
                    name: local.name.clone(),
                    value: shown_json(&local.value, local.sensitive)?,
                    sensitive: local.sensitive,
                });
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let value = Value::from("hunter2");
        assert_eq!(shown(&value, true), "<sensitive>");
        assert_eq!(shown(&value, false), "\"hunter2\"");
        assert_eq!(shown(&Value::Unknown, false), "<unknown>");
        assert_eq!(shown(&Value::Unknown, true), "<unknown>");
        assert_eq!(
            shown_json(&Value::Unknown, true).unwrap(),
            serde_json::json!("<unknown>")
        );
        assert_eq!(
            shown_json(&value, true).unwrap(),
            serde_json::json!("<sensitive>")
        );
    }
}
