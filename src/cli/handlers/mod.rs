// src/cli/handlers/mod.rs

pub mod list;
pub mod run;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::core::config_finder;
use crate::models::Config;

/// Loads the configuration for this invocation: either the explicitly given
/// file or the discovered layer stack. Returns the config together with the
/// application directory child processes run in.
pub fn load_config(
    explicit: Option<&PathBuf>,
    params: &[String],
) -> Result<(Config, PathBuf)> {
    match explicit {
        Some(path) => {
            let mut visited = HashSet::new();
            let config = config_finder::load_with_imports(path, params, &mut visited)?;
            let directory = path
                .parent()
                .map(|p| p.to_path_buf())
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((config, directory))
        }
        None => {
            let cwd = std::env::current_dir().context("Failed to determine working directory")?;
            let discovered = config_finder::discover(&cwd, params)?;
            Ok((discovered.config, discovered.directory))
        }
    }
}

/// The environment a script belongs to: its namespace, or the default
/// environment for un-namespaced scripts.
pub fn owning_environment<'a>(config: &'a Config, namespace: Option<&'a str>) -> &'a str {
    namespace.unwrap_or_else(|| config.default_environment_name())
}
