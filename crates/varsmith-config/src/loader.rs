//! Configuration discovery on disk.
//!
//! A project is either a single KDL file or a directory. In a directory every
//! `*.kdl` file that is not a var-file holds declarations, and
//! `*.auto.vars.kdl` / `*.auto.vars.json` files are applied automatically
//! before any var-file given explicitly.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::declaration::{Config, parse_config};
use crate::resolver::Inputs;
use crate::varfile::load_var_file;
use crate::{ConfigError, ConfigResult};

/// Declarations loaded from disk, plus the var-files found next to them.
#[derive(Debug, Clone)]
pub struct Project {
    /// Configuration files, in load order.
    pub files: Vec<PathBuf>,
    pub config: Config,
    /// Auto var-files, in application order.
    pub auto_var_files: Vec<PathBuf>,
}

impl Project {
    /// Build resolution inputs: auto var-files first, then `var_files` in the
    /// order given, then `flags`.
    pub fn inputs(
        &self,
        var_files: &[PathBuf],
        flags: &[String],
        env: impl IntoIterator<Item = (String, String)>,
    ) -> ConfigResult<Inputs> {
        let mut inputs = Inputs::new().with_env_vars(env);
        for path in self.auto_var_files.iter().chain(var_files) {
            inputs = inputs.with_var_file(load_var_file(path)?);
        }
        for flag in flags {
            inputs = inputs.with_flag(flag.clone());
        }
        Ok(inputs)
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

pub fn is_var_file(path: &Path) -> bool {
    let name = file_name(path);
    name.ends_with(".vars.kdl") || name.ends_with(".vars.json")
}

pub fn is_auto_var_file(path: &Path) -> bool {
    let name = file_name(path);
    name.ends_with(".auto.vars.kdl") || name.ends_with(".auto.vars.json")
}

fn is_config_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "kdl") && !is_var_file(path)
}

/// Parse a single configuration file, attaching its path to any error.
pub fn load_config_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::InFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

/// Load a project from a configuration file or directory.
pub fn load_project(path: &Path) -> ConfigResult<Project> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.is_dir() {
        let config = load_config_file(path)?;
        return Ok(Project {
            files: vec![path.to_path_buf()],
            config,
            auto_var_files: Vec::new(),
        });
    }

    let mut entries = Vec::new();
    let dir = std::fs::read_dir(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    for entry in dir {
        let entry_path = entry?.path();
        if entry_path.is_file() {
            entries.push(entry_path);
        }
    }
    entries.sort();

    let mut config = Config::default();
    let mut files = Vec::new();
    let mut auto_var_files = Vec::new();

    for entry in entries {
        if is_auto_var_file(&entry) {
            debug!(path = %entry.display(), "found auto var-file");
            auto_var_files.push(entry);
        } else if is_config_file(&entry) {
            debug!(path = %entry.display(), "loading configuration file");
            let file_config = load_config_file(&entry)?;
            config
                .merge(file_config)
                .map_err(|source| ConfigError::InFile {
                    path: entry.clone(),
                    source: Box::new(source),
                })?;
            files.push(entry);
        }
    }

    if files.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "configuration files (*.kdl) in {}",
            path.display()
        )));
    }

    Ok(Project {
        files,
        config,
        auto_var_files,
    })
}
