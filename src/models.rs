//! # Data Models
//!
//! This module defines the core data structures used throughout the application:
//!
//! 1.  **Configuration Models**: The merged, in-memory shape of one or more
//!     configuration files (`Config`, `ConfigEnvironment`, `ScriptsPath`,
//!     `TemplateSpec`). These are produced by the config loader, combined by the
//!     config merger, and immutable from then on.
//!
//! 2.  **Script Models**: `Script` describes one executable file found under a
//!     configured scripts path, together with its owning namespace and
//!     visibility.
//!
//! 3.  **Command Stream Models**: `Command` is the typed output of the script
//!     parser. The process executor drives this stream; it is the only contract
//!     between parsing and execution.
//!
//! The raw, serde-facing YAML models live in `core::config_loader`; this module
//! only contains the strict internal representation.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_ENVIRONMENT, SCRIPT_EXTENSIONS};

/// One directory of scripts, optionally tagged with an environment namespace.
///
/// The path is validated lazily by the script finder, not at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptsPath {
    /// Directory containing the script files.
    pub path: PathBuf,
    /// Namespace prefix inherited from the owning environment (`None` for the
    /// default environment).
    pub namespace: Option<String>,
    /// Whether scripts under this path are hidden from listings.
    pub hidden: bool,
}

/// A single executable script file discovered under a [`ScriptsPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Directory the script file lives in.
    pub directory: PathBuf,
    /// File name including extension.
    pub filename: String,
    /// Whether the owning scripts path is hidden.
    pub hidden: bool,
    /// Namespace inherited from the owning scripts path.
    pub namespace: Option<String>,
    /// Human-readable description, read from a leading `# DESCRIPTION:` comment.
    pub description: Option<String>,
}

impl Script {
    /// The logical name of the script: file stem, prefixed with `<ns>:` when the
    /// owning path is namespaced.
    pub fn name(&self) -> String {
        let stem = Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone());
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, stem),
            None => stem,
        }
    }

    /// Absolute path of the script file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Whether a file name carries one of the recognised script extensions.
    pub fn has_script_extension(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SCRIPT_EXTENSIONS.contains(&e))
            .unwrap_or(false)
    }
}

/// A template declaration: `source` is substituted and written to `destination`.
/// Both paths are absolute after config loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    /// File containing `__NAME__` placeholders.
    pub source: PathBuf,
    /// File the rendered content is written to.
    pub destination: PathBuf,
}

/// A named slice of configuration: script paths, variables, constants,
/// templates and dotenv files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigEnvironment {
    /// Hidden environments are omitted from script listings.
    pub hidden: bool,
    /// Optional user-facing description.
    pub description: Option<String>,
    /// Script directories, in declaration order.
    pub scripts_paths: Vec<ScriptsPath>,
    /// Lazily evaluated shell expressions, insertion-ordered.
    pub dynamic_variables: IndexMap<String, String>,
    /// Literal values, insertion-ordered.
    pub constants: IndexMap<String, String>,
    /// Template declarations, in declaration order.
    pub templates: Vec<TemplateSpec>,
    /// Dotenv files; later files overwrite earlier ones.
    pub dotenv_paths: Vec<PathBuf>,
}

/// The top-level merged configuration.
///
/// Invariant: `environments` always contains the default environment, and the
/// default environment's script paths carry no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Banner printed before listings.
    pub header: Option<String>,
    /// Explicitly configured default environment name, if any.
    pub default_environment: Option<String>,
    /// All environments, default first, keyed by name.
    pub environments: IndexMap<String, ConfigEnvironment>,
    /// Raw CLI parameters passed after the script name.
    pub params: Vec<String>,
}

impl Config {
    /// The name of the default environment (falls back to `"default"`).
    pub fn default_environment_name(&self) -> &str {
        self.default_environment
            .as_deref()
            .unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// The default environment. Panics only if the loader invariant was broken.
    pub fn default_env(&self) -> &ConfigEnvironment {
        self.environments
            .get(self.default_environment_name())
            .expect("config invariant: default environment must exist")
    }

    /// Looks up an environment by name.
    pub fn environment(&self, name: &str) -> Option<&ConfigEnvironment> {
        self.environments.get(name)
    }

    /// All script paths across every environment, default environment first,
    /// then the remaining environments in declaration order.
    pub fn all_script_paths(&self) -> Vec<ScriptsPath> {
        let default_name = self.default_environment_name().to_string();
        let mut paths = self.default_env().scripts_paths.clone();
        for (name, env) in &self.environments {
            if *name != default_name {
                paths.extend(env.scripts_paths.iter().cloned());
            }
        }
        paths
    }
}

/// One entry of the typed command stream emitted by the script parser.
///
/// `line` is the 1-based physical line the command originated from, used for
/// diagnostics and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A shell command line, run synchronously or deferred into the background
    /// queue depending on `deferred`.
    Process {
        shell: String,
        line: usize,
        ignore_error: bool,
        tty: bool,
        deferred: bool,
    },
    /// An inline template render.
    Template {
        source: PathBuf,
        destination: PathBuf,
        line: usize,
    },
    /// A barrier draining all outstanding deferred processes.
    Wait { line: usize },
    /// A whole script file executed through a rendered temporary copy.
    BashScript { path: PathBuf, line: usize },
}

impl Command {
    /// The source line this command was parsed from.
    pub fn line(&self) -> usize {
        match self {
            Command::Process { line, .. }
            | Command::Template { line, .. }
            | Command::Wait { line }
            | Command::BashScript { line, .. } => *line,
        }
    }
}
