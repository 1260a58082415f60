//! # Config Merger
//!
//! Combines two [`Config`]s under one of two semantics:
//!
//! - **override**: a local file replaces the executables of its parent.
//!   Script paths and templates are *replaced* wholesale when the override
//!   declares any, while variable maps and dotenv files are merged.
//! - **import**: another ruleset is brought in additively. Script paths,
//!   templates and dotenv files from both sides are kept.
//!
//! Both operations are total; environments present on only one side pass
//! through unchanged.

use indexmap::IndexMap;

use crate::models::{Config, ConfigEnvironment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    Override,
    Import,
}

/// Applies override semantics: `other` wins where it declares anything.
pub fn merge_override(base: Config, other: Config) -> Config {
    merge(base, other, MergeMode::Override)
}

/// Applies import semantics: executables from both sides are kept.
pub fn merge_import(base: Config, other: Config) -> Config {
    merge(base, other, MergeMode::Import)
}

/// The effective view of one environment: the default environment's values
/// overlaid with the named environment's own declarations (override
/// semantics for a single environment pair). Asking for the default
/// environment returns it unchanged.
pub fn environment_view(config: &Config, name: &str) -> Option<ConfigEnvironment> {
    let named = config.environment(name)?;
    if name == config.default_environment_name() {
        return Some(named.clone());
    }
    Some(merge_environment(
        config.default_env(),
        named,
        MergeMode::Override,
    ))
}

fn merge(base: Config, other: Config, mode: MergeMode) -> Config {
    let mut environments: IndexMap<String, ConfigEnvironment> = IndexMap::new();

    for (name, base_env) in &base.environments {
        match other.environments.get(name) {
            Some(other_env) => {
                environments.insert(name.clone(), merge_environment(base_env, other_env, mode));
            }
            None => {
                environments.insert(name.clone(), base_env.clone());
            }
        }
    }
    for (name, other_env) in &other.environments {
        if !environments.contains_key(name) {
            environments.insert(name.clone(), other_env.clone());
        }
    }

    Config {
        header: non_empty(other.header).or(base.header),
        default_environment: non_empty(other.default_environment).or(base.default_environment),
        environments,
        params: if other.params.is_empty() {
            base.params
        } else {
            other.params
        },
    }
}

fn merge_environment(
    base: &ConfigEnvironment,
    other: &ConfigEnvironment,
    mode: MergeMode,
) -> ConfigEnvironment {
    let scripts_paths = match mode {
        MergeMode::Override if !other.scripts_paths.is_empty() => other.scripts_paths.clone(),
        MergeMode::Override => base.scripts_paths.clone(),
        MergeMode::Import => {
            let mut paths = base.scripts_paths.clone();
            paths.extend(other.scripts_paths.iter().cloned());
            paths
        }
    };

    let templates = match mode {
        MergeMode::Override if !other.templates.is_empty() => other.templates.clone(),
        MergeMode::Override => base.templates.clone(),
        MergeMode::Import => {
            let mut templates = base.templates.clone();
            templates.extend(other.templates.iter().cloned());
            templates
        }
    };

    let dotenv_paths = match mode {
        MergeMode::Override => {
            // Merged like the variable maps: base order first, new entries
            // appended, entries present on both sides not duplicated.
            let mut paths = base.dotenv_paths.clone();
            for path in &other.dotenv_paths {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
            paths
        }
        MergeMode::Import => {
            let mut paths = base.dotenv_paths.clone();
            paths.extend(other.dotenv_paths.iter().cloned());
            paths
        }
    };

    let mut dynamic_variables = base.dynamic_variables.clone();
    dynamic_variables.extend(
        other
            .dynamic_variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let mut constants = base.constants.clone();
    constants.extend(other.constants.iter().map(|(k, v)| (k.clone(), v.clone())));

    ConfigEnvironment {
        hidden: base.hidden || other.hidden,
        description: other.description.clone().or_else(|| base.description.clone()),
        scripts_paths,
        dynamic_variables,
        constants,
        templates,
        dotenv_paths,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
