//! varsmith CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use varsmith_config::DEFAULT_ENV_PREFIX;

mod commands;

#[derive(Parser)]
#[command(name = "varsmith")]
#[command(about = "Inspect and resolve configuration input variables", long_about = None)]
struct Cli {
    /// Log filter, e.g. `debug` or `varsmith_config=trace`
    #[arg(long, global = true, env = "VARSMITH_LOG", default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "VARSMITH_LOG_FORMAT", default_value = "text")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Where variable values come from.
#[derive(Args, Debug, Clone)]
pub struct VarArgs {
    /// Configuration file or directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Set a variable, as NAME=VALUE (repeatable; later flags win)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Load variable values from a file (repeatable; later files win)
    #[arg(long = "var-file", value_name = "PATH")]
    pub var_files: Vec<PathBuf>,

    /// Prefix of environment variables that set variables
    #[arg(long, env = "VARSMITH_ENV_PREFIX", default_value = DEFAULT_ENV_PREFIX)]
    pub env_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the configuration and its variable values are valid
    Validate {
        #[command(flatten)]
        vars: VarArgs,
    },
    /// Show variables and locals with their values and origins
    Inspect {
        #[command(flatten)]
        vars: VarArgs,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Resolve every variable and local, failing on unset variables
    Resolve {
        #[command(flatten)]
        vars: VarArgs,
        /// Print sensitive values instead of redacting them
        #[arg(long)]
        show_sensitive: bool,
    },
    /// Evaluate an expression against the resolved variables and locals
    Eval {
        /// Expression, e.g. `upper(var.region)`
        expression: String,
        #[command(flatten)]
        vars: VarArgs,
        /// Print sensitive values instead of redacting them
        #[arg(long)]
        show_sensitive: bool,
    },
}

/// Accept the single-dash `-var` and `-var-file` spellings as well.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s)
                if s == "-var"
                    || s == "-var-file"
                    || s.starts_with("-var=")
                    || s.starts_with("-var-file=") =>
            {
                OsString::from(format!("-{s}"))
            }
            _ => arg,
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    match cli.log_format {
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        OutputFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    match cli.command {
        Commands::Validate { vars } => commands::validate::run(&vars)?,
        Commands::Inspect { vars, format } => commands::inspect::run(&vars, format)?,
        Commands::Resolve {
            vars,
            show_sensitive,
        } => commands::resolve::run(&vars, show_sensitive)?,
        Commands::Eval {
            expression,
            vars,
            show_sensitive,
        } => commands::eval::run(&expression, &vars, show_sensitive)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_single_dash_flags() {
        let args = normalize_args(
            ["varsmith", "validate", "-var", "a=1", "-var-file=x.vars.kdl", "--var", "b=2"]
                .map(OsString::from),
        );
        assert_eq!(
            args,
            ["varsmith", "validate", "--var", "a=1", "--var-file=x.vars.kdl", "--var", "b=2"]
                .map(OsString::from)
        );
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from(normalize_args(
            ["varsmith", "resolve", "conf", "-var", "region=eu", "--show-sensitive"]
                .map(OsString::from),
        ));
        match cli.command {
            Commands::Resolve {
                vars,
                show_sensitive,
            } => {
                assert_eq!(vars.path, PathBuf::from("conf"));
                assert_eq!(vars.vars, vec!["region=eu".to_string()]);
                assert!(show_sensitive);
            }
            _ => panic!("expected resolve"),
        }
    }
}
