//! # Config Finder
//!
//! Discovers the configuration file family for the current working directory
//! and assembles the final merged [`Config`]. Discovery walks upward until a
//! directory contains any member of the family; within that directory the
//! layering is `.dist` (distributed defaults) overridden by the plain file,
//! overridden by the `.override` file. Every loaded file may pull in further
//! configs through its `import:` key, merged additively.

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::constants::{CONFIG_BASENAMES, DIST_SUFFIX, OVERRIDE_SUFFIX};
use crate::core::{config_loader, config_merger};
use crate::models::Config;

/// A discovered and fully merged configuration.
#[derive(Debug)]
pub struct DiscoveredConfig {
    pub config: Config,
    /// The directory the root config file was found in; used as the working
    /// directory for executed processes.
    pub directory: PathBuf,
}

/// Walks from `start` upward looking for config files, then loads and merges
/// the whole layer stack.
pub fn discover(start: &Path, params: &[String]) -> Result<DiscoveredConfig> {
    for dir in start.ancestors() {
        let layers = layer_files_in(dir);
        if layers.is_empty() {
            continue;
        }
        log::debug!("Found {} config layer(s) in '{}'", layers.len(), dir.display());

        let mut merged: Option<Config> = None;
        for layer in layers {
            // Each layer gets its own visited set: sibling layers may
            // legitimately import the same shared file; the set only breaks
            // cycles within one layer's own import chain.
            let mut visited = HashSet::new();
            let config = load_with_imports(&layer, params, &mut visited)?;
            merged = Some(match merged {
                Some(base) => config_merger::merge_override(base, config),
                None => config,
            });
        }
        return Ok(DiscoveredConfig {
            config: merged.expect("at least one layer was loaded"),
            directory: dir.to_path_buf(),
        });
    }

    Err(anyhow!(
        "No configuration file found in '{}' or any parent directory\n\n\
         hint: Create a .maestro.yaml file in your project root\n\
         hint: Use -c/--config to point at an explicit file",
        start.display()
    ))
}

/// Loads a single config file, applying its `import:` entries recursively in
/// import mode. `visited` breaks import cycles on canonicalised paths.
pub fn load_with_imports(
    path: &Path,
    params: &[String],
    visited: &mut HashSet<PathBuf>,
) -> Result<Config> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        log::warn!(
            "Config '{}' is imported more than once; skipping repeat",
            path.display()
        );
        return Ok(Config::default());
    }

    let loaded = config_loader::load(path, params)?;
    let mut config = loaded.config;
    for import in loaded.imports {
        let imported = load_with_imports(&import, params, visited)?;
        config = config_merger::merge_import(config, imported);
    }
    Ok(config)
}

/// The ordered layer stack present in `dir`: dist file first, then the plain
/// file, then the override file, for each recognised base name.
fn layer_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut layers = Vec::new();
    for base in CONFIG_BASENAMES {
        for candidate in [
            format!("{}{}", base, DIST_SUFFIX),
            base.to_string(),
            format!("{}{}", base, OVERRIDE_SUFFIX),
        ] {
            let path = dir.join(&candidate);
            if path.is_file() {
                layers.push(path);
            }
        }
    }
    layers
}
