//! # Process Environment
//!
//! Materialises the value set of one [`ConfigEnvironment`] and creates child
//! processes carrying it. The merge precedence is fixed here, highest last:
//! dotenv values, then the host environment (which overrides dotenv and
//! nothing else), then constants, then dynamic variables.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::process::Command as StdCommand;
use std::sync::Arc;

use crate::core::environment::{
    Value, resolve_constants, resolve_dotenv_variables, resolve_templates, resolve_variables,
};
use crate::core::template::Template;
use crate::models::ConfigEnvironment;

/// Builds a `std::process::Command` that runs `command_line` through the
/// host shell.
pub fn host_shell_command(command_line: &str) -> StdCommand {
    if cfg!(target_os = "windows") {
        let mut command = StdCommand::new("cmd");
        command.arg("/C").arg(command_line);
        command
    } else {
        let mut command = StdCommand::new("sh");
        command.arg("-c").arg(command_line);
        command
    }
}

/// The resolved value set and templates of one environment.
pub struct ProcessEnvironment {
    values: IndexMap<String, Arc<Value>>,
    templates: Vec<Template>,
}

impl ProcessEnvironment {
    /// Merges the four provider sets under the documented precedence.
    pub fn new(
        constants: IndexMap<String, Arc<Value>>,
        variables: IndexMap<String, Arc<Value>>,
        templates: Vec<Template>,
        dotenv_variables: IndexMap<String, Arc<Value>>,
    ) -> Self {
        let mut values: IndexMap<String, Arc<Value>> = IndexMap::new();
        for (name, value) in dotenv_variables {
            // A variable present in the host environment wins over its
            // dotenv default.
            match std::env::var(&name) {
                Ok(host_value) => {
                    values.insert(name, Arc::new(Value::constant(host_value)));
                }
                Err(_) => {
                    values.insert(name, value);
                }
            }
        }
        values.extend(constants);
        values.extend(variables);
        Self { values, templates }
    }

    /// Resolves the provider sets of `environment` and builds the merged view.
    pub fn from_environment(env: &ConfigEnvironment) -> Result<Self> {
        Ok(Self::new(
            resolve_constants(&env.constants),
            resolve_variables(&env.dynamic_variables),
            resolve_templates(&env.templates),
            resolve_dotenv_variables(&env.dotenv_paths)?,
        ))
    }

    /// The merged value providers, shared across the whole run so that lazy
    /// values resolve at most once.
    pub fn all_values(&self) -> &IndexMap<String, Arc<Value>> {
        &self.values
    }

    /// Templates declared at the environment level.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Creates a child process running `command_line` through the host
    /// shell, with every resolved value exported into its environment.
    /// No timeout is configured on the child.
    pub fn create_process(&self, command_line: &str) -> Result<StdCommand> {
        let mut command = host_shell_command(command_line);
        for (name, value) in &self.values {
            let resolved = value
                .value()
                .with_context(|| format!("Failed to resolve environment value '{}'", name))?;
            command.env(name, resolved);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn constant_map(pairs: &[(&str, &str)]) -> IndexMap<String, Arc<Value>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Arc::new(Value::constant(*v))))
            .collect()
    }

    #[test]
    fn constants_override_dotenv_values() {
        let env = ProcessEnvironment::new(
            constant_map(&[("SHARED", "constant")]),
            IndexMap::new(),
            Vec::new(),
            constant_map(&[("SHARED", "dotenv"), ("ONLY_DOTENV", "x")]),
        );
        assert_eq!(
            env.all_values().get("SHARED").unwrap().value().unwrap(),
            "constant"
        );
        assert_eq!(
            env.all_values().get("ONLY_DOTENV").unwrap().value().unwrap(),
            "x"
        );
    }

    #[test]
    fn variables_override_constants() {
        let mut variables = IndexMap::new();
        variables.insert(
            "SHARED".to_string(),
            Arc::new(Value::constant("variable")),
        );
        let env = ProcessEnvironment::new(
            constant_map(&[("SHARED", "constant")]),
            variables,
            Vec::new(),
            IndexMap::new(),
        );
        assert_eq!(
            env.all_values().get("SHARED").unwrap().value().unwrap(),
            "variable"
        );
    }

    #[test]
    fn host_environment_overrides_dotenv_but_not_constants() {
        // SAFETY: test-local variable name, no concurrent reader depends on it.
        unsafe { std::env::set_var("MAESTRO_TEST_HOST_VAR", "from-host") };
        let env = ProcessEnvironment::new(
            constant_map(&[("PINNED", "constant")]),
            IndexMap::new(),
            Vec::new(),
            constant_map(&[("MAESTRO_TEST_HOST_VAR", "from-dotenv"), ("PINNED", "dotenv")]),
        );
        assert_eq!(
            env.all_values()
                .get("MAESTRO_TEST_HOST_VAR")
                .unwrap()
                .value()
                .unwrap(),
            "from-host"
        );
        assert_eq!(
            env.all_values().get("PINNED").unwrap().value().unwrap(),
            "constant"
        );
        unsafe { std::env::remove_var("MAESTRO_TEST_HOST_VAR") };
    }

    #[test]
    fn created_processes_carry_the_resolved_values() {
        let env = ProcessEnvironment::new(
            constant_map(&[("GREETING", "hello")]),
            IndexMap::new(),
            Vec::new(),
            IndexMap::new(),
        );
        let output = env
            .create_process("echo \"$GREETING\"")
            .unwrap()
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn from_environment_resolves_dotenv_files() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv = dir.path().join(".env");
        fs::write(&dotenv, "FROM_FILE=yes\n").unwrap();

        let config_env = ConfigEnvironment {
            dotenv_paths: vec![dotenv],
            ..Default::default()
        };
        let env = ProcessEnvironment::from_environment(&config_env).unwrap();
        assert_eq!(
            env.all_values().get("FROM_FILE").unwrap().value().unwrap(),
            "yes"
        );
    }
}
