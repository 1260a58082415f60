//! # Script Finder
//!
//! Enumerates executable script files under the configured script paths and
//! resolves script names, exactly or fuzzily. Paths are validated here, at
//! enumeration time, not when the configuration is loaded.

use indexmap::IndexMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::DESCRIPTION_MARKER;
use crate::models::{Script, ScriptsPath};

/// Maximum edit distance (exclusive) for fuzzy script-name matches.
const FUZZY_DISTANCE: usize = 3;

/// Errors raised while locating scripts.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script path '{0}' is not a readable directory")]
    PathNotValid(PathBuf),
    #[error("Script '{0}' not found")]
    NotFound(String),
    #[error("Failed to read script directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Looks up scripts across an ordered list of script paths.
pub struct ScriptFinder {
    paths: Vec<ScriptsPath>,
}

impl ScriptFinder {
    pub fn new(paths: Vec<ScriptsPath>) -> Self {
        Self { paths }
    }

    /// Every script under every configured path, keyed by logical name.
    ///
    /// Directories are read in configured order, files in ascending name
    /// order. When two paths provide the same name the later path wins; the
    /// shadowing is logged.
    pub fn all_scripts(&self) -> Result<IndexMap<String, Script>, ScriptError> {
        let mut scripts: IndexMap<String, Script> = IndexMap::new();
        for scripts_path in &self.paths {
            for script in read_scripts_dir(scripts_path)? {
                let name = script.name();
                if let Some(previous) = scripts.insert(name.clone(), script) {
                    log::warn!(
                        "Script '{}' from '{}' is shadowed by a later path",
                        name,
                        previous.directory.display()
                    );
                }
            }
        }
        Ok(scripts)
    }

    /// Like [`all_scripts`](Self::all_scripts), with hidden paths dropped.
    pub fn all_visible_scripts(&self) -> Result<IndexMap<String, Script>, ScriptError> {
        let mut scripts = self.all_scripts()?;
        scripts.retain(|_, script| !script.hidden);
        Ok(scripts)
    }

    /// Finds a script by exact name.
    pub fn find_by_name(&self, name: &str) -> Result<Script, ScriptError> {
        self.all_scripts()?
            .shift_remove(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))
    }

    /// Scripts whose name contains `query` or is within a small edit
    /// distance of it; used for "did you mean" suggestions.
    pub fn find_by_partial_name(&self, query: &str) -> Result<Vec<Script>, ScriptError> {
        Ok(self
            .all_scripts()?
            .into_iter()
            .filter(|(name, _)| {
                name.contains(query) || edit_distance(name, query) < FUZZY_DISTANCE
            })
            .map(|(_, script)| script)
            .collect())
    }
}

fn read_scripts_dir(scripts_path: &ScriptsPath) -> Result<Vec<Script>, ScriptError> {
    if !scripts_path.path.is_dir() {
        return Err(ScriptError::PathNotValid(scripts_path.path.clone()));
    }

    let entries = fs::read_dir(&scripts_path.path).map_err(|source| ScriptError::Io {
        path: scripts_path.path.clone(),
        source,
    })?;

    let mut filenames: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| Script::has_script_extension(name))
        .collect();
    filenames.sort();

    Ok(filenames
        .into_iter()
        .map(|filename| {
            let description = read_description(&scripts_path.path.join(&filename));
            Script {
                directory: scripts_path.path.clone(),
                filename,
                hidden: scripts_path.hidden,
                namespace: scripts_path.namespace.clone(),
                description,
            }
        })
        .collect())
}

/// Scans the first lines of a script for a `# DESCRIPTION:` comment.
fn read_description(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .take(10)
        .map_while(|line| line.ok())
        .find_map(|line| {
            line.strip_prefix(DESCRIPTION_MARKER)
                .map(|rest| rest.trim().to_string())
        })
}

/// Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a_chars.len(), b_chars.len());

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut previous: Vec<usize> = (0..=b_len).collect();
    let mut current = vec![0usize; b_len + 1];

    for i in 1..=a_len {
        current[0] = i;
        for j in 1..=b_len {
            let substitution_cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + substitution_cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_len]
}
