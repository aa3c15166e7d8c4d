//! Value resolution for input variables.
//!
//! Values are merged from four sources, lowest to highest precedence:
//! 1. Declared defaults
//! 2. Environment variables named `<prefix><name>` (default prefix `VARSMITH_VAR_`)
//! 3. Var-files, in the order given (later files win)
//! 4. Command-line `NAME=VALUE` flags, in the order given (later flags win)

use derive_more::Display;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};
use varsmith_core::{Value, VarType, coerce};

use crate::coerce::coerce_raw;
use crate::declaration::{Config, Variable};
use crate::expression::{self, Expr, ExprError, Scope};
use crate::locals::{EvaluatedLocal, evaluate_locals};
use crate::varfile::VarFile;
use crate::{ConfigError, ConfigResult};

/// Environment variable prefix used when none is configured.
pub const DEFAULT_ENV_PREFIX: &str = "VARSMITH_VAR_";

/// How to treat variables that end up without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Unset variables are an error (building or resolving for real).
    #[default]
    Strict,
    /// Unset variables resolve to `Value::Unknown` (validate, inspect).
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub mode: Mode,
    pub env_prefix: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Strict,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

impl ResolveOptions {
    pub fn lenient() -> Self {
        Self {
            mode: Mode::Lenient,
            ..Self::default()
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }
}

/// Where a variable's value came from.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Source {
    #[display("default")]
    Default,
    #[display("environment variable {_0}")]
    Env(String),
    #[display("var-file {}", _0.display())]
    VarFile(PathBuf),
    #[display("command-line flag")]
    Flag,
    #[display("unset")]
    Unset,
}

/// Raw inputs to resolution: environment entries, var-files and flags.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub env: Vec<(String, String)>,
    pub var_files: Vec<VarFile>,
    /// `NAME=VALUE` assignments, in command-line order.
    pub flags: Vec<String>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn with_var_file(mut self, file: VarFile) -> Self {
        self.var_files.push(file);
        self
    }

    pub fn with_flag(mut self, assignment: impl Into<String>) -> Self {
        self.flags.push(assignment.into());
        self
    }
}

/// A variable after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVariable {
    pub name: String,
    pub value: Value,
    pub var_type: VarType,
    pub source: Source,
    pub sensitive: bool,
    pub description: Option<String>,
}

/// The outcome of resolving a configuration.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    /// Variables in declaration order.
    pub variables: Vec<ResolvedVariable>,
    /// Locals in declaration order.
    pub locals: Vec<EvaluatedLocal>,
    /// Non-fatal problems, e.g. var-file assignments to undeclared variables.
    pub warnings: Vec<String>,
}

impl Resolved {
    pub fn variable(&self, name: &str) -> Option<&ResolvedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn local(&self, name: &str) -> Option<&EvaluatedLocal> {
        self.locals.iter().find(|l| l.name == name)
    }

    pub fn variable_values(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    pub fn local_values(&self) -> BTreeMap<String, Value> {
        self.locals
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect()
    }

    /// Whether every variable and local has a known value.
    pub fn is_complete(&self) -> bool {
        self.variables.iter().all(|v| !v.value.contains_unknown())
            && self.locals.iter().all(|l| !l.value.contains_unknown())
    }

    /// Evaluate an ad-hoc expression against the resolved values.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, ExprError> {
        let variables = self.variable_values();
        let locals = self.local_values();
        expression::evaluate(expr, &Scope::new(&variables, &locals))
    }
}

/// Resolves variable values and evaluates locals for a configuration.
pub struct Resolver<'a> {
    config: &'a Config,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config, options: ResolveOptions) -> Self {
        Self { config, options }
    }

    pub fn resolve(&self, inputs: &Inputs) -> ConfigResult<Resolved> {
        let config: &'a Config = self.config;
        let mut warnings = Vec::new();
        let mut assigned: HashMap<&'a str, (Value, Source)> = HashMap::new();

        for variable in &config.variables {
            if let Some(default) = &variable.default {
                assigned.insert(&variable.name, (default.clone(), Source::Default));
            }
        }

        self.apply_env(inputs, &mut assigned)?;
        self.apply_var_files(inputs, &mut assigned, &mut warnings)?;
        self.apply_flags(inputs, &mut assigned)?;

        let mut variables = Vec::with_capacity(config.variables.len());
        let mut unset = Vec::new();

        for variable in &config.variables {
            let (value, source) = match assigned.remove(variable.name.as_str()) {
                Some(found) => found,
                None => {
                    unset.push(variable.name.clone());
                    (Value::Unknown, Source::Unset)
                }
            };
            debug!(variable = %variable.name, source = %source, "resolved variable");
            variables.push(ResolvedVariable {
                name: variable.name.clone(),
                value,
                var_type: variable.effective_type(),
                source,
                sensitive: variable.sensitive,
                description: variable.description.clone(),
            });
        }

        if !unset.is_empty() && self.options.mode == Mode::Strict {
            return Err(ConfigError::Unset(unset));
        }

        for (variable, resolved) in config.variables.iter().zip(&variables) {
            check_validations(variable, &resolved.value)?;
        }

        let values: BTreeMap<String, Value> = variables
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect();
        let sensitive: HashSet<String> = variables
            .iter()
            .filter(|v| v.sensitive)
            .map(|v| v.name.clone())
            .collect();
        let locals = evaluate_locals(config, &values, &sensitive)?;

        Ok(Resolved {
            variables,
            locals,
            warnings,
        })
    }

    fn apply_env(
        &self,
        inputs: &Inputs,
        assigned: &mut HashMap<&'a str, (Value, Source)>,
    ) -> ConfigResult<()> {
        let config: &'a Config = self.config;
        if self.options.env_prefix.is_empty() {
            return Ok(());
        }

        for (key, raw) in &inputs.env {
            let Some(name) = key.strip_prefix(&self.options.env_prefix) else {
                continue;
            };
            let Some(variable) = config.variable(name) else {
                continue;
            };
            let value = coerce_raw(raw, &variable.effective_type()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("variable '{name}' from environment variable {key}"),
                    message: e.to_string(),
                }
            })?;
            assigned.insert(&variable.name, (value, Source::Env(key.clone())));
        }
        Ok(())
    }

    fn apply_var_files(
        &self,
        inputs: &Inputs,
        assigned: &mut HashMap<&'a str, (Value, Source)>,
        warnings: &mut Vec<String>,
    ) -> ConfigResult<()> {
        let config: &'a Config = self.config;
        for file in &inputs.var_files {
            for (name, value) in &file.assignments {
                let Some(variable) = config.variable(name) else {
                    let message = format!(
                        "var-file {} assigns undeclared variable '{name}'; the value is ignored",
                        file.path.display()
                    );
                    warn!("{message}");
                    warnings.push(message);
                    continue;
                };
                let value = coerce(value.clone(), &variable.effective_type()).map_err(|e| {
                    ConfigError::InvalidValue {
                        field: format!(
                            "variable '{name}' from var-file {}",
                            file.path.display()
                        ),
                        message: e.to_string(),
                    }
                })?;
                assigned.insert(&variable.name, (value, Source::VarFile(file.path.clone())));
            }
        }
        Ok(())
    }

    fn apply_flags(
        &self,
        inputs: &Inputs,
        assigned: &mut HashMap<&'a str, (Value, Source)>,
    ) -> ConfigResult<()> {
        let config: &'a Config = self.config;
        for flag in &inputs.flags {
            let (name, raw) = parse_flag(flag)?;
            let variable = config.variable(name).ok_or_else(|| {
                ConfigError::UndeclaredVariable {
                    name: name.to_string(),
                    origin: "command-line flag".to_string(),
                }
            })?;
            let value = coerce_raw(raw, &variable.effective_type()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("variable '{name}' from command-line flag"),
                    message: e.to_string(),
                }
            })?;
            assigned.insert(&variable.name, (value, Source::Flag));
        }
        Ok(())
    }
}

/// Split a `NAME=VALUE` flag. The value may itself contain `=`.
pub fn parse_flag(flag: &str) -> ConfigResult<(&str, &str)> {
    match flag.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(ConfigError::InvalidValue {
            field: "--var".to_string(),
            message: format!("'{flag}' is not of the form NAME=VALUE"),
        }),
    }
}

fn check_validations(variable: &Variable, value: &Value) -> ConfigResult<()> {
    if variable.validations.is_empty() {
        return Ok(());
    }

    let mut variables = BTreeMap::new();
    variables.insert(variable.name.clone(), value.clone());
    let locals = BTreeMap::new();
    let scope = Scope::new(&variables, &locals);

    for rule in &variable.validations {
        let outcome =
            expression::evaluate(&rule.condition, &scope).map_err(|source| {
                ConfigError::Expression {
                    context: format!("validation condition of variable '{}'", variable.name),
                    source,
                }
            })?;
        match outcome {
            Value::Bool(true) | Value::Unknown => {}
            Value::Bool(false) => {
                return Err(ConfigError::ValidationFailed {
                    name: variable.name.clone(),
                    message: rule.error_message.clone(),
                });
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: format!("validation condition of variable '{}'", variable.name),
                    message: format!(
                        "condition `{}` must produce a bool, got {}",
                        rule.source,
                        other.kind()
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::parse_config;
    use crate::varfile::parse_kdl_assignments;

    fn config() -> Config {
        parse_config(
            r#"
            variable "region" type="string" default="us-east-1"
            variable "instances" type="number" default=1
            variable "zones" type="list(string)" {
                default "a" "b"
            }
            variable "password" sensitive=#true default="changeme"
            locals {
                name "${var.region}-x${var.instances}"
            }
            "#,
        )
        .unwrap()
    }

    fn var_file(path: &str, kdl: &str) -> VarFile {
        VarFile {
            path: PathBuf::from(path),
            assignments: parse_kdl_assignments(kdl).unwrap(),
        }
    }

    #[test]
    fn test_defaults_only() {
        let config = config();
        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new())
            .unwrap();

        let region = resolved.variable("region").unwrap();
        assert_eq!(region.value, Value::from("us-east-1"));
        assert_eq!(region.source, Source::Default);
        assert_eq!(
            resolved.variable("zones").unwrap().value,
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            resolved.local("name").unwrap().value,
            Value::from("us-east-1-x1")
        );
        assert!(resolved.is_complete());
    }

    #[test]
    fn test_precedence_flag_over_file_over_env_over_default() {
        let config = config();
        let resolver = Resolver::new(&config, ResolveOptions::default());

        let env_only = Inputs::new().with_env("VARSMITH_VAR_region", "eu-west-1");
        let resolved = resolver.resolve(&env_only).unwrap();
        assert_eq!(resolved.variable("region").unwrap().value, Value::from("eu-west-1"));

        let with_file = env_only
            .clone()
            .with_var_file(var_file("a.vars.kdl", r#"region "ap-south-1""#));
        let resolved = resolver.resolve(&with_file).unwrap();
        let region = resolved.variable("region").unwrap();
        assert_eq!(region.value, Value::from("ap-south-1"));
        assert_eq!(region.source, Source::VarFile(PathBuf::from("a.vars.kdl")));

        let with_flag = with_file.with_flag("region=sa-east-1");
        let resolved = resolver.resolve(&with_flag).unwrap();
        let region = resolved.variable("region").unwrap();
        assert_eq!(region.value, Value::from("sa-east-1"));
        assert_eq!(region.source, Source::Flag);
        assert_eq!(resolved.local("name").unwrap().value, Value::from("sa-east-1-x1"));
    }

    #[test]
    fn test_later_var_file_and_flag_win() {
        let config = config();
        let inputs = Inputs::new()
            .with_var_file(var_file("a.vars.kdl", "instances 2"))
            .with_var_file(var_file("b.vars.kdl", "instances 3"))
            .with_flag("zones=[\"x\"]")
            .with_flag("zones=[\"y\", \"z\"]");

        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&inputs)
            .unwrap();

        assert_eq!(resolved.variable("instances").unwrap().value, Value::Number(3.0));
        assert_eq!(
            resolved.variable("zones").unwrap().value,
            Value::List(vec![Value::from("y"), Value::from("z")])
        );
    }

    #[test]
    fn test_env_values_are_coerced() {
        let config = config();
        let inputs = Inputs::new()
            .with_env("VARSMITH_VAR_instances", "4")
            .with_env("VARSMITH_VAR_zones", r#"["b", "c"]"#)
            .with_env("VARSMITH_VAR_undeclared", "ignored")
            .with_env("OTHER", "ignored");

        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&inputs)
            .unwrap();
        assert_eq!(resolved.variable("instances").unwrap().value, Value::Number(4.0));
        assert_eq!(
            resolved.variable("instances").unwrap().source,
            Source::Env("VARSMITH_VAR_instances".to_string())
        );
        assert_eq!(
            resolved.variable("zones").unwrap().value,
            Value::List(vec![Value::from("b"), Value::from("c")])
        );
    }

    #[test]
    fn test_custom_env_prefix() {
        let config = config();
        let inputs = Inputs::new()
            .with_env("PKR_VAR_region", "eu-north-1")
            .with_env("VARSMITH_VAR_region", "ignored");
        let resolved = Resolver::new(&config, ResolveOptions::default().with_env_prefix("PKR_VAR_"))
            .resolve(&inputs)
            .unwrap();
        assert_eq!(resolved.variable("region").unwrap().value, Value::from("eu-north-1"));
    }

    #[test]
    fn test_invalid_raw_value() {
        let config = config();
        let err = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new().with_flag("instances=many"))
            .unwrap_err();
        assert!(err.to_string().contains("variable 'instances' from command-line flag"));
    }

    #[test]
    fn test_flag_for_undeclared_variable() {
        let config = config();
        let err = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new().with_flag("nope=1"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UndeclaredVariable { .. }));
    }

    #[test]
    fn test_malformed_flag() {
        assert!(parse_flag("region").is_err());
        assert!(parse_flag("=x").is_err());
        assert_eq!(parse_flag("opts=a=b").unwrap(), ("opts", "a=b"));
    }

    #[test]
    fn test_var_file_for_undeclared_variable_warns() {
        let config = config();
        let inputs = Inputs::new().with_var_file(var_file("a.vars.kdl", "stray 1"));
        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&inputs)
            .unwrap();
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("'stray'"));
    }

    #[test]
    fn test_var_file_type_mismatch() {
        let config = config();
        let inputs = Inputs::new().with_var_file(var_file("a.vars.kdl", "zones {\n    a 1\n}"));
        let err = Resolver::new(&config, ResolveOptions::default())
            .resolve(&inputs)
            .unwrap_err();
        assert!(err.to_string().contains("from var-file a.vars.kdl"));
    }

    #[test]
    fn test_missing_value_strict_vs_lenient() {
        let config = parse_config(
            r#"
            variable "ami_id"
            variable "tag"
            variable "region" default="us-east-1"
            local "image" "${var.ami_id}-${var.region}"
            "#,
        )
        .unwrap();

        let err = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new())
            .unwrap_err();
        match err {
            ConfigError::Unset(names) => assert_eq!(names, vec!["ami_id", "tag"]),
            other => panic!("unexpected error: {other}"),
        }

        let resolved = Resolver::new(&config, ResolveOptions::lenient())
            .resolve(&Inputs::new())
            .unwrap();
        let ami = resolved.variable("ami_id").unwrap();
        assert_eq!(ami.value, Value::Unknown);
        assert_eq!(ami.source, Source::Unset);
        assert_eq!(resolved.local("image").unwrap().value, Value::Unknown);
        assert!(!resolved.is_complete());
    }

    #[test]
    fn test_validation_rules() {
        let config = parse_config(
            r#"
            variable "size" type="number" {
                validation condition="var.size > 0 && var.size <= 10" error-message="size must be between 1 and 10"
            }
            "#,
        )
        .unwrap();
        let resolver = Resolver::new(&config, ResolveOptions::default());

        assert!(resolver.resolve(&Inputs::new().with_flag("size=5")).is_ok());

        let err = resolver.resolve(&Inputs::new().with_flag("size=50")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for variable 'size': size must be between 1 and 10"
        );

        let lenient = Resolver::new(&config, ResolveOptions::lenient());
        assert!(lenient.resolve(&Inputs::new()).is_ok());
    }

    #[test]
    fn test_validation_condition_must_be_bool() {
        let config = parse_config(
            r#"
            variable "name" type="string" default="abc" {
                validation condition="length(var.name)" error-message="name is required"
            }
            "#,
        )
        .unwrap();
        let err = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new())
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, message } => {
                assert_eq!(field, "validation condition of variable 'name'");
                assert!(message.contains("must produce a bool, got number"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sensitive_variable_marks_locals() {
        let config = parse_config(
            r#"
            variable "password" sensitive=#true default="pw"
            local "dsn" "postgres://app:${var.password}@db"
            "#,
        )
        .unwrap();
        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new())
            .unwrap();
        assert!(resolved.variable("password").unwrap().sensitive);
        assert!(resolved.local("dsn").unwrap().sensitive);
    }

    #[test]
    fn test_evaluate_expression_against_resolved() {
        let config = config();
        let resolved = Resolver::new(&config, ResolveOptions::default())
            .resolve(&Inputs::new())
            .unwrap();
        let expr = expression::parse("upper(local.name)").unwrap();
        assert_eq!(resolved.evaluate(&expr).unwrap(), Value::from("US-EAST-1-X1"));
    }
}
