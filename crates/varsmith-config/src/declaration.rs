//! Variable and local declarations.
//!
//! ```kdl
//! variable "region" type="string" default="us-east-1" description="Target region"
//! variable "tags" type="map(string)" {
//!     default {
//!         owner "ops"
//!     }
//!     validation condition="length(var.tags) > 0" error-message="tags must not be empty"
//! }
//! locals {
//!     image_name "${var.region}-image"
//!     zone_count expr="length(var.zones)"
//! }
//! local "password_url" expr="\"https://${var.password}@host\"" sensitive=#true
//! ```

use kdl::{KdlDocument, KdlNode, KdlValue};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use varsmith_core::{Value, VarType, coerce};

use crate::expression::lexer::{Segment, split_template};
use crate::expression::{self, Expr, Reference};
use crate::nodes::{
    args, get_bool_prop, get_first_string_arg, get_string_prop, kdl_to_value, node_value, props,
};
use crate::{ConfigError, ConfigResult};

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap());

/// A declared input variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Declared type, if any.
    pub var_type: Option<VarType>,
    /// Default value, already coerced to the declared type.
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Sensitive values are never displayed.
    pub sensitive: bool,
    pub validations: Vec<Validation>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: None,
            default: None,
            description: None,
            sensitive: false,
            validations: Vec::new(),
        }
    }

    /// The declared type, else the type inferred from the default, else `any`.
    pub fn effective_type(&self) -> VarType {
        match (&self.var_type, &self.default) {
            (Some(ty), _) => ty.clone(),
            (None, Some(default)) => VarType::infer(default),
            (None, None) => VarType::Any,
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A custom rule checked against a variable's resolved value.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub condition: Expr,
    /// Condition as written, for display.
    pub source: String,
    pub error_message: String,
}

/// A local value computed from variables and other locals.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub expr: Expr,
    pub sensitive: bool,
}

impl Local {
    pub fn references(&self) -> Vec<Reference> {
        expression::references(&self.expr)
    }
}

/// All declarations of a configuration, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub variables: Vec<Variable>,
    pub locals: Vec<Local>,
}

impl Config {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().find(|l| l.name == name)
    }

    /// Add the declarations of another file, rejecting duplicate names.
    pub fn merge(&mut self, other: Config) -> ConfigResult<()> {
        for variable in other.variables {
            self.add_variable(variable)?;
        }
        for local in other.locals {
            self.add_local(local)?;
        }
        Ok(())
    }

    fn add_variable(&mut self, variable: Variable) -> ConfigResult<()> {
        if self.variable(&variable.name).is_some() {
            return Err(ConfigError::Duplicate(format!("variable '{}'", variable.name)));
        }
        self.variables.push(variable);
        Ok(())
    }

    fn add_local(&mut self, local: Local) -> ConfigResult<()> {
        if self.local(&local.name).is_some() {
            return Err(ConfigError::Duplicate(format!("local '{}'", local.name)));
        }
        self.locals.push(local);
        Ok(())
    }
}

/// Parse variable and local declarations from KDL text.
///
/// Top-level nodes other than `variable`, `locals` and `local` are ignored so
/// declarations can live next to other configuration.
pub fn parse_config(kdl: &str) -> ConfigResult<Config> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "variable" => config.add_variable(parse_variable(node)?)?,
            "locals" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        let name = child.name().value().to_string();
                        config.add_local(parse_local(name, child, false)?)?;
                    }
                }
            }
            "local" => {
                let name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("local name".to_string()))?;
                config.add_local(parse_local(name, node, true)?)?;
            }
            other => debug!(node = other, "ignoring non-variable node"),
        }
    }

    Ok(config)
}

fn validate_name(kind: &str, name: &str) -> ConfigResult<()> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: format!("{kind} name"),
            message: format!(
                "'{name}' must start with a letter or underscore and contain only letters, digits, '_' or '-'"
            ),
        })
    }
}

fn parse_type(name: &str, text: &str) -> ConfigResult<VarType> {
    text.parse().map_err(|source| ConfigError::Type {
        name: name.to_string(),
        source,
    })
}

fn parse_variable(node: &KdlNode) -> ConfigResult<Variable> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("variable name".to_string()))?;
    validate_name("variable", &name)?;

    if args(node).count() > 1 {
        return Err(ConfigError::InvalidValue {
            field: format!("variable '{name}'"),
            message: "expected a single name argument".to_string(),
        });
    }

    let mut variable = Variable::new(name.clone());
    let mut type_text = None;

    for (key, value) in props(node) {
        match key {
            "type" => type_text = Some(expect_string(&name, key, value)?),
            "default" => variable.default = Some(kdl_to_value(value)),
            "description" => variable.description = Some(expect_string(&name, key, value)?),
            "sensitive" => variable.sensitive = get_bool_prop(node, "sensitive")?.unwrap_or(false),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: format!("variable '{name}'"),
                    message: format!("unknown property '{other}'"),
                });
            }
        }
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "default" => {
                    if variable.default.is_some() {
                        return Err(ConfigError::Duplicate(format!(
                            "default for variable '{name}'"
                        )));
                    }
                    variable.default = Some(node_value(child)?);
                }
                "type" => {
                    type_text = Some(get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField(format!("type for variable '{name}'"))
                    })?);
                }
                "description" => variable.description = get_first_string_arg(child),
                "sensitive" => {
                    variable.sensitive = args(child).next().and_then(KdlValue::as_bool).ok_or_else(
                        || ConfigError::InvalidValue {
                            field: format!("variable '{name}' sensitive"),
                            message: "expected #true or #false".to_string(),
                        },
                    )?;
                }
                "validation" => variable.validations.push(parse_validation(&name, child)?),
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("variable '{name}'"),
                        message: format!("unknown block '{other}'"),
                    });
                }
            }
        }
    }

    if let Some(text) = type_text {
        variable.var_type = Some(parse_type(&name, &text)?);
    }

    if let Some(default) = variable.default.take() {
        let default = literal_default(&name, default)?;
        let default = match &variable.var_type {
            Some(ty) => coerce(default, ty).map_err(|source| ConfigError::Type {
                name: name.clone(),
                source,
            })?,
            None => default,
        };
        variable.default = Some(default);
    }

    Ok(variable)
}

fn expect_string(name: &str, key: &str, value: &KdlValue) -> ConfigResult<String> {
    value
        .as_string()
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: format!("variable '{name}' {key}"),
            message: format!("expected a string, found {value}"),
        })
}

/// Defaults are literals: a default may not interpolate other variables.
/// Escaped markers (`$${`) are unescaped.
fn literal_default(name: &str, value: Value) -> ConfigResult<Value> {
    match value {
        Value::String(s) => {
            let segments = split_template(&s).map_err(|source| ConfigError::Expression {
                context: format!("default for variable '{name}'"),
                source,
            })?;
            let mut text = String::new();
            for segment in segments {
                match segment {
                    Segment::Literal(literal) => text.push_str(&literal),
                    Segment::Interpolation(..) => {
                        return Err(ConfigError::InvalidReference(format!(
                            "default for variable '{name}' cannot reference other values; use a local instead"
                        )));
                    }
                }
            }
            Ok(Value::String(text))
        }
        Value::List(items) => items
            .into_iter()
            .map(|item| literal_default(name, item))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::List),
        Value::Map(entries) => entries
            .into_iter()
            .map(|(key, item)| literal_default(name, item).map(|v| (key, v)))
            .collect::<ConfigResult<_>>()
            .map(Value::Map),
        other => Ok(other),
    }
}

fn parse_validation(variable: &str, node: &KdlNode) -> ConfigResult<Validation> {
    let source = get_string_prop(node, "condition").ok_or_else(|| {
        ConfigError::MissingField(format!("condition for validation of variable '{variable}'"))
    })?;
    let error_message = get_string_prop(node, "error-message")
        .or_else(|| get_string_prop(node, "error_message"))
        .ok_or_else(|| {
            ConfigError::MissingField(format!(
                "error-message for validation of variable '{variable}'"
            ))
        })?;

    let condition = expression::parse(&source).map_err(|source| ConfigError::Expression {
        context: format!("validation condition of variable '{variable}'"),
        source,
    })?;

    let own = Reference::variable(variable);
    let refs = expression::references(&condition);
    if let Some(foreign) = refs.iter().find(|r| **r != own) {
        return Err(ConfigError::InvalidReference(format!(
            "validation condition of variable '{variable}' may only reference {own}, found {foreign}"
        )));
    }
    if refs.is_empty() {
        return Err(ConfigError::InvalidReference(format!(
            "validation condition of variable '{variable}' must reference {own}"
        )));
    }

    Ok(Validation {
        condition,
        source,
        error_message,
    })
}

/// `named_by_arg` is set for `local "name" value` nodes, whose first argument
/// is the name rather than part of the value.
fn parse_local(name: String, node: &KdlNode, named_by_arg: bool) -> ConfigResult<Local> {
    validate_name("local", &name)?;
    let sensitive = get_bool_prop(node, "sensitive")?.unwrap_or(false);
    let context = || format!("local '{name}'");

    let expr = if let Some(source) = get_string_prop(node, "expr") {
        expression::parse(&source).map_err(|source| ConfigError::Expression {
            context: context(),
            source,
        })?
    } else {
        let value_node = if named_by_arg {
            strip_name_arg(node)
        } else {
            node.clone()
        };
        let positional: Vec<_> = args(&value_node).collect();
        match (positional.as_slice(), value_node.children()) {
            ([KdlValue::String(text)], None) => {
                expression::parse_template(text).map_err(|source| ConfigError::Expression {
                    context: context(),
                    source,
                })?
            }
            ([], None) => {
                return Err(ConfigError::MissingField(format!("value for local '{name}'")));
            }
            _ => Expr::Literal(node_value(&value_node)?),
        }
    };

    Ok(Local {
        name,
        expr,
        sensitive,
    })
}

/// Copy of a `local` node without its leading name argument.
fn strip_name_arg(node: &KdlNode) -> KdlNode {
    let mut copy = node.clone();
    let mut removed = false;
    copy.entries_mut().retain(|entry| {
        if !removed && entry.name().is_none() {
            removed = true;
            return false;
        }
        true
    });
    copy
}

/// Names of locals that must be evaluated before `local`, in order of first use.
pub fn local_dependencies(local: &Local) -> Vec<String> {
    local
        .references()
        .into_iter()
        .filter(|r| r.kind == expression::RefKind::Local)
        .map(|r| r.name)
        .collect()
}
