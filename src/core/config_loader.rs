//! # Config Loader
//!
//! Reads a single configuration file and produces a strict [`Config`]. The
//! user-facing YAML syntax is deserialized into the `Raw*` serde models below
//! (with `deny_unknown_fields`, so typos in keys are caught as errors) and
//! then compiled into the internal representation: paths become absolute
//! relative to the config file, top-level keys populate the default
//! environment, and every named environment inherits its own name as the
//! namespace of its script paths.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{DEFAULT_ENVIRONMENT, DIST_SUFFIX, OVERRIDE_SUFFIX};
use crate::models::{Config, ConfigEnvironment, ScriptsPath, TemplateSpec};

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config at '{path}': {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("'{0}' is not a supported config file name")]
    UnsupportedFile(PathBuf),
    #[error("Invalid path '{raw}' referenced from '{config}': no such file or directory")]
    InvalidPath { raw: String, config: PathBuf },
    #[error("Environment name '{0}' collides with the default environment")]
    ReservedEnvironmentName(String),
    #[error("'default_environment' must not be empty in '{0}'")]
    EmptyDefaultEnvironment(PathBuf),
}

// --- User-facing YAML syntax models ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    default_environment: Option<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    dynamic: IndexMap<String, String>,
    #[serde(default, rename = "const")]
    constants: IndexMap<String, String>,
    #[serde(default)]
    templates: Vec<RawTemplate>,
    #[serde(default)]
    dotenv: Vec<String>,
    #[serde(default)]
    environments: IndexMap<String, RawEnvironment>,
    #[serde(default)]
    import: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvironment {
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    dynamic: IndexMap<String, String>,
    #[serde(default, rename = "const")]
    constants: IndexMap<String, String>,
    #[serde(default)]
    templates: Vec<RawTemplate>,
    #[serde(default)]
    dotenv: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    source: String,
    destination: String,
}

/// A loaded config together with the (already absolutised) paths of the
/// config files its `import:` key names.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub imports: Vec<PathBuf>,
}

/// Whether a file name belongs to the recognised YAML suffix family:
/// `.yaml` / `.yml`, optionally further suffixed `.dist` or `.override`.
pub fn is_supported(filename: &str) -> bool {
    let base = filename
        .strip_suffix(DIST_SUFFIX)
        .or_else(|| filename.strip_suffix(OVERRIDE_SUFFIX))
        .unwrap_or(filename);
    base.ends_with(".yaml") || base.ends_with(".yml")
}

/// Loads and compiles one configuration file.
pub fn load(path: &Path, params: &[String]) -> Result<LoadedConfig, ConfigError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !is_supported(&filename) {
        return Err(ConfigError::UnsupportedFile(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?;

    build_config(raw, path, params)
}

fn build_config(
    raw: RawConfig,
    config_path: &Path,
    params: &[String],
) -> Result<LoadedConfig, ConfigError> {
    if raw.default_environment.as_deref() == Some("") {
        return Err(ConfigError::EmptyDefaultEnvironment(
            config_path.to_path_buf(),
        ));
    }
    let default_name = raw
        .default_environment
        .clone()
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let mut environments = IndexMap::new();
    environments.insert(
        default_name.clone(),
        build_environment(
            None,
            false,
            None,
            &raw.paths,
            raw.dynamic,
            raw.constants,
            &raw.templates,
            &raw.dotenv,
            config_path,
        )?,
    );

    for (name, raw_env) in raw.environments {
        if name == default_name {
            return Err(ConfigError::ReservedEnvironmentName(name));
        }
        let env = build_environment(
            Some(name.clone()),
            raw_env.hidden,
            raw_env.description,
            &raw_env.paths,
            raw_env.dynamic,
            raw_env.constants,
            &raw_env.templates,
            &raw_env.dotenv,
            config_path,
        )?;
        environments.insert(name, env);
    }

    let imports = raw
        .import
        .iter()
        .map(|p| fix_path(p, config_path, true))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LoadedConfig {
        config: Config {
            header: raw.header,
            default_environment: raw.default_environment,
            environments,
            params: params.to_vec(),
        },
        imports,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_environment(
    namespace: Option<String>,
    hidden: bool,
    description: Option<String>,
    paths: &[String],
    dynamic_variables: IndexMap<String, String>,
    constants: IndexMap<String, String>,
    templates: &[RawTemplate],
    dotenv: &[String],
    config_path: &Path,
) -> Result<ConfigEnvironment, ConfigError> {
    let scripts_paths = paths
        .iter()
        .map(|raw| {
            // Script directories are validated lazily by the script finder.
            Ok(ScriptsPath {
                path: fix_path(raw, config_path, false)?,
                namespace: namespace.clone(),
                hidden,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let templates = templates
        .iter()
        .map(|raw| {
            Ok(TemplateSpec {
                source: fix_path(&raw.source, config_path, true)?,
                destination: fix_path(&raw.destination, config_path, false)?,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let dotenv_paths = dotenv
        .iter()
        .map(|raw| fix_path(raw, config_path, false))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConfigEnvironment {
        hidden,
        description,
        scripts_paths,
        dynamic_variables,
        constants,
        templates,
        dotenv_paths,
    })
}

/// Resolves a raw path from a config file.
///
/// Absolute paths are accepted as-is; anything else is resolved relative to
/// the config file's directory. For `required` files the result must exist,
/// otherwise an [`ConfigError::InvalidPath`] is raised.
pub fn fix_path(raw: &str, base_file: &Path, required: bool) -> Result<PathBuf, ConfigError> {
    let candidate = PathBuf::from(raw);
    let resolved = if candidate.is_absolute() {
        candidate
    } else {
        base_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(candidate)
    };

    if required && !resolved.exists() {
        return Err(ConfigError::InvalidPath {
            raw: raw.to_string(),
            config: base_file.to_path_buf(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn recognises_the_yaml_suffix_family() {
        assert!(is_supported(".maestro.yaml"));
        assert!(is_supported(".maestro.yml"));
        assert!(is_supported("custom.yaml"));
        assert!(is_supported(".maestro.yaml.dist"));
        assert!(is_supported(".maestro.yml.override"));
        assert!(!is_supported(".maestro.toml"));
        assert!(!is_supported(".maestro.yaml.bak"));
        assert!(!is_supported("yaml"));
    }

    #[test]
    fn top_level_keys_populate_the_default_environment() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();
        let path = write_config(
            dir.path(),
            ".maestro.yaml",
            "header: demo\npaths: [scripts]\nconst:\n  FOO: bar\ndynamic:\n  REV: git rev-parse HEAD\n",
        );

        let loaded = load(&path, &[]).unwrap();
        let config = loaded.config;
        assert_eq!(config.header.as_deref(), Some("demo"));
        let default = config.default_env();
        assert_eq!(default.scripts_paths.len(), 1);
        assert_eq!(default.scripts_paths[0].namespace, None);
        assert!(default.scripts_paths[0].path.is_absolute() || default.scripts_paths[0].path.starts_with(dir.path()));
        assert_eq!(default.constants.get("FOO").unwrap(), "bar");
        assert_eq!(default.dynamic_variables.get("REV").unwrap(), "git rev-parse HEAD");
    }

    #[test]
    fn environment_paths_inherit_the_environment_namespace() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let path = write_config(
            dir.path(),
            ".maestro.yaml",
            "paths: [a]\nenvironments:\n  staging:\n    paths: [b]\n    hidden: true\n",
        );

        let config = load(&path, &[]).unwrap().config;
        let paths = config.all_script_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].namespace, None);
        assert_eq!(paths[1].namespace.as_deref(), Some("staging"));
        assert!(paths[1].hidden);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), ".maestro.yaml", "psths: [scripts]\n");
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse { .. }));
    }

    #[test]
    fn missing_template_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            ".maestro.yaml",
            "templates:\n  - source: nope.tpl\n    destination: out.txt\n",
        );
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));
    }

    #[test]
    fn environment_named_like_the_default_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            ".maestro.yaml",
            "environments:\n  default:\n    paths: []\n",
        );
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedEnvironmentName(_)));
    }

    #[test]
    fn empty_default_environment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), ".maestro.yaml", "default_environment: \"\"\n");
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDefaultEnvironment(_)));
    }

    #[test]
    fn absolute_paths_are_accepted_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join(".maestro.yaml");
        let fixed = fix_path(dir.path().to_str().unwrap(), &config_file, true).unwrap();
        assert_eq!(fixed, dir.path());
    }
}
