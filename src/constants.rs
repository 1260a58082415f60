// src/constants.rs

/// Base names of the configuration files searched for in a project directory.
pub const CONFIG_BASENAMES: [&str; 2] = [".maestro.yaml", ".maestro.yml"];

/// Suffix for distributed default configuration files (e.g. `.maestro.yaml.dist`).
pub const DIST_SUFFIX: &str = ".dist";

/// Suffix for local override configuration files (e.g. `.maestro.yaml.override`).
pub const OVERRIDE_SUFFIX: &str = ".override";

/// File extensions recognised as executable scripts.
pub const SCRIPT_EXTENSIONS: [&str; 2] = ["sh", "psh"];

/// Name of the environment used when a config does not declare one.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Marker comment scanned for when reading a script's description.
pub const DESCRIPTION_MARKER: &str = "# DESCRIPTION:";
