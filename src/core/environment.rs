//! # Environment Resolver
//!
//! Builds value providers from the raw inputs of a [`ConfigEnvironment`]:
//! literal constants, lazily evaluated shell expressions, dotenv files and
//! template declarations. All resolver functions return fresh maps; nothing
//! here holds shared mutable state.
//!
//! A [`Value`] is a thunk yielding a string. The `Shell` variant executes its
//! expression in the host shell exactly once and memoises the outcome, success
//! or failure, in a one-shot cell.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::core::{dotenv, template::Template};
use crate::models::TemplateSpec;
use crate::system::process_env;

/// Errors raised while materialising a value provider.
///
/// Clonable so the memoising cell can hand the same failure to every caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Failed to start shell for expression '{expression}': {message}")]
    ShellSpawn { expression: String, message: String },
    #[error("Expression '{expression}' exited with a non-zero status")]
    NonZeroExit { expression: String },
    #[error("Expression '{expression}' produced output that was not valid UTF-8")]
    InvalidUtf8 { expression: String },
}

/// A thunk that yields a string value, eagerly or lazily.
#[derive(Debug)]
pub enum Value {
    /// An already-resolved literal.
    Constant(String),
    /// A shell expression evaluated on first access; the trimmed stdout (or
    /// the failure) is cached for every later access.
    Shell {
        expression: String,
        resolved: Mutex<Option<Result<String, ResolveError>>>,
    },
}

impl Value {
    /// Wraps a literal string.
    pub fn constant(value: impl Into<String>) -> Self {
        Value::Constant(value.into())
    }

    /// Wraps a shell expression for lazy evaluation.
    pub fn shell(expression: impl Into<String>) -> Self {
        Value::Shell {
            expression: expression.into(),
            resolved: Mutex::new(None),
        }
    }

    /// Resolves the value, evaluating and memoising on first access.
    pub fn value(&self) -> Result<String, ResolveError> {
        match self {
            Value::Constant(value) => Ok(value.clone()),
            Value::Shell {
                expression,
                resolved,
            } => {
                let mut cell = resolved.lock().unwrap();
                if let Some(outcome) = &*cell {
                    return outcome.clone();
                }
                let outcome = evaluate_expression(expression);
                *cell = Some(outcome.clone());
                outcome
            }
        }
    }
}

/// Runs a shell expression and returns its trimmed stdout.
fn evaluate_expression(expression: &str) -> Result<String, ResolveError> {
    log::debug!("Evaluating dynamic expression: '{}'", expression);
    let output = process_env::host_shell_command(expression)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| ResolveError::ShellSpawn {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ResolveError::NonZeroExit {
            expression: expression.to_string(),
        });
    }

    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|_| ResolveError::InvalidUtf8 {
            expression: expression.to_string(),
        })
}

/// Wraps literal constants into value providers.
pub fn resolve_constants(constants: &IndexMap<String, String>) -> IndexMap<String, Arc<Value>> {
    constants
        .iter()
        .map(|(name, value)| (name.clone(), Arc::new(Value::constant(value.clone()))))
        .collect()
}

/// Wraps dynamic shell expressions into lazy value providers.
pub fn resolve_variables(variables: &IndexMap<String, String>) -> IndexMap<String, Arc<Value>> {
    variables
        .iter()
        .map(|(name, expr)| (name.clone(), Arc::new(Value::shell(expr.clone()))))
        .collect()
}

/// Turns template declarations into renderable [`Template`]s.
pub fn resolve_templates(specs: &[TemplateSpec]) -> Vec<Template> {
    specs
        .iter()
        .map(|spec| Template {
            source: spec.source.clone(),
            destination: spec.destination.clone(),
        })
        .collect()
}

/// Parses dotenv files in the given order into value providers.
/// Later files overwrite earlier ones.
pub fn resolve_dotenv_variables(
    paths: &[PathBuf],
) -> anyhow::Result<IndexMap<String, Arc<Value>>> {
    let mut values = IndexMap::new();
    for path in paths {
        for (name, value) in dotenv::load_file(Path::new(path))? {
            values.insert(name, Arc::new(Value::constant(value)));
        }
    }
    Ok(values)
}
