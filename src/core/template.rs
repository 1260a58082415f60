//! # Template Engine
//!
//! Substitutes `__NAME__` placeholders with resolved values. Lookup is
//! case-sensitive and exact; unknown placeholders are left untouched so that
//! shell scripts containing unrelated double-underscore sequences are never
//! corrupted.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::environment::Value;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"__([A-Za-z0-9_]+?)__").unwrap();
}

/// A template file pair; `content()` reads the source on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Template {
    /// Loads the template source from disk.
    pub fn content(&self) -> Result<String> {
        fs::read_to_string(&self.source)
            .with_context(|| format!("Failed to read template '{}'", self.source.display()))
    }
}

/// Replaces every known `__NAME__` placeholder in `text` with its resolved
/// value. Resolution happens lazily per placeholder; a provider failure
/// aborts the render.
pub fn render(text: &str, values: &IndexMap<String, Arc<Value>>) -> Result<String> {
    let mut rendered = String::with_capacity(text.len());
    let mut last_end = 0usize;

    for captures in PLACEHOLDER_RE.captures_iter(text) {
        let matched = captures.get(0).unwrap();
        let name = captures.get(1).unwrap().as_str();
        if let Some(value) = values.get(name) {
            let resolved = value
                .value()
                .with_context(|| format!("Failed to resolve placeholder '__{}__'", name))?;
            rendered.push_str(&text[last_end..matched.start()]);
            rendered.push_str(&resolved);
            last_end = matched.end();
        }
        // Unknown placeholders stay in the surrounding slice untouched.
    }

    rendered.push_str(&text[last_end..]);
    Ok(rendered)
}
