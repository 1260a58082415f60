// src/cli/handlers/list.rs

use anyhow::Result;
use colored::Colorize;
use indexmap::IndexMap;

use crate::core::script_finder::ScriptFinder;
use crate::models::{Config, Script};

/// Prints the header banner and the table of visible scripts, grouped by
/// environment. Hidden environments and hidden paths are omitted.
pub fn handle(config: &Config) -> Result<()> {
    if let Some(header) = &config.header {
        println!("{}", header.bold());
    }

    let finder = ScriptFinder::new(config.all_script_paths());
    let scripts = finder.all_visible_scripts()?;

    if scripts.is_empty() {
        println!("{}", "No scripts found.".yellow());
        return Ok(());
    }

    // Group by namespace, keeping the default group first.
    let mut groups: IndexMap<String, Vec<Script>> = IndexMap::new();
    for (_, script) in scripts {
        let group = script
            .namespace
            .clone()
            .unwrap_or_else(|| config.default_environment_name().to_string());
        groups.entry(group).or_default().push(script);
    }

    let width = groups
        .values()
        .flatten()
        .map(|s| s.name().len())
        .max()
        .unwrap_or(0);

    println!("\n{}", "Available scripts:".bold());
    for (group, scripts) in groups {
        let description = config
            .environment(&group)
            .and_then(|env| env.description.clone());
        match description {
            Some(desc) => println!("\n  {} {}", group.green().bold(), format!("({})", desc).dimmed()),
            None => println!("\n  {}", group.green().bold()),
        }
        for script in scripts {
            let description = script.description.as_deref().unwrap_or("");
            println!(
                "    {:width$}  {}",
                script.name().cyan(),
                description.dimmed(),
                width = width
            );
        }
    }
    Ok(())
}
