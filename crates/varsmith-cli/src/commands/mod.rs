//! CLI command implementations.

pub mod eval;
pub mod inspect;
pub mod resolve;
pub mod validate;

use anyhow::{Context, Result};
use tracing::info;
use varsmith_config::{Mode, Project, ResolveOptions, Resolved, Resolver, load_project};
use varsmith_core::Value;

use crate::VarArgs;

/// Placeholder shown instead of a sensitive value.
pub const SENSITIVE: &str = "<sensitive>";

/// Whether to print [`SENSITIVE`] in place of `value`. An unknown value has
/// nothing to hide and is always shown as `<unknown>`.
pub fn redacted(value: &Value, sensitive: bool) -> bool {
    sensitive && !value.is_unknown()
}

/// Load the project at `args.path` and resolve its variables.
pub fn load_and_resolve(args: &VarArgs, mode: Mode) -> Result<(Project, Resolved)> {
    let project = load_project(&args.path)
        .with_context(|| format!("Failed to load configuration: {}", args.path.display()))?;
    info!(
        files = project.files.len(),
        variables = project.config.variables.len(),
        locals = project.config.locals.len(),
        "loaded configuration"
    );

    let inputs = project
        .inputs(&args.var_files, &args.vars, std::env::vars())
        .context("Failed to load variable values")?;

    let options = ResolveOptions {
        mode,
        env_prefix: args.env_prefix.clone(),
    };
    let resolved = Resolver::new(&project.config, options)
        .resolve(&inputs)
        .context("Failed to resolve variables")?;

    for warning in &resolved.warnings {
        eprintln!("Warning: {warning}");
    }

    Ok((project, resolved))
}
