// src/cli/handlers/run.rs

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::handlers::owning_environment;
use crate::core::{config_merger, script_finder::ScriptFinder, script_parser::FileScriptLoader};
use crate::models::Config;
use crate::system::{
    executor::ProcessExecutor, logger::ConsoleLogger, process_env::ProcessEnvironment,
};

/// Runs one script by name: locate it, parse it into a command stream, build
/// the process environment of its owning environment and execute.
pub fn handle(config: &Config, app_dir: PathBuf, script_name: &str) -> Result<()> {
    let finder = ScriptFinder::new(config.all_script_paths());

    let script = match finder.find_by_name(script_name) {
        Ok(script) => script,
        Err(err) => {
            let suggestions = finder
                .find_by_partial_name(script_name)
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.name())
                .collect::<Vec<_>>();
            if suggestions.is_empty() {
                return Err(err).context("No script with that name is configured");
            }
            return Err(anyhow!(
                "{}\n\nhint: Did you mean one of: {}?",
                err,
                suggestions.join(", ")
            ));
        }
    };
    log::debug!(
        "Resolved script '{}' to '{}'",
        script_name,
        script.path().display()
    );

    let env_name = owning_environment(config, script.namespace.as_deref()).to_string();
    let environment = config_merger::environment_view(config, &env_name)
        .ok_or_else(|| anyhow!("Environment '{}' is not configured", env_name))?;
    let process_env = ProcessEnvironment::from_environment(&environment)?;

    let loader = FileScriptLoader::new(&finder);
    let commands = loader.load(&script)?;
    if commands.is_empty() {
        println!("{}", "Script is empty. Nothing to execute.".yellow());
        return Ok(());
    }

    let mut logger = ConsoleLogger;
    let mut executor = ProcessExecutor::new(&process_env, &mut logger, app_dir);
    executor.execute(&script, &commands)
}
