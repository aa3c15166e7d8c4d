//! Configuration and resolution errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::expression::ExprError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("cycle detected in dependencies: {0}")]
    CycleDetected(String),

    #[error("variable '{name}': {source}")]
    Type {
        name: String,
        #[source]
        source: varsmith_core::Error,
    },

    #[error("{context}: {source}")]
    Expression {
        context: String,
        #[source]
        source: ExprError,
    },

    #[error("undeclared variable '{name}' assigned by {origin}")]
    UndeclaredVariable { name: String, origin: String },

    #[error("unset variable(s): {}", .0.join(", "))]
    Unset(Vec<String>),

    #[error("invalid value for variable '{name}': {message}")]
    ValidationFailed { name: String, message: String },

    #[error("invalid var-file {}: {message}", .path.display())]
    VarFile { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
