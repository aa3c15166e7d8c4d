//! Input variable and local resolution for varsmith configurations.
//!
//! This crate handles:
//! - Variable and local declarations (KDL)
//! - The expression language used by locals and validation rules
//! - Var-files (KDL and JSON)
//! - Merging values from defaults, environment, var-files and flags
//! - Evaluating locals in dependency order

pub mod coerce;
pub mod declaration;
pub mod error;
pub mod expression;
pub mod loader;
pub mod locals;
pub mod nodes;
pub mod resolver;
pub mod varfile;

pub use declaration::{Config, Local, Validation, Variable, parse_config};
pub use error::{ConfigError, ConfigResult};
pub use loader::{Project, load_project};
pub use locals::EvaluatedLocal;
pub use resolver::{
    DEFAULT_ENV_PREFIX, Inputs, Mode, ResolveOptions, Resolved, ResolvedVariable, Resolver, Source,
};
pub use varfile::{VarFile, load_var_file};
