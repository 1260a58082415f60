// src/bin/maestro.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use maestro::cli::{Cli, handlers};

/// The main entry point of the `maestro` application.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        let mut causes = e.chain().skip(1);
        if let Some(cause) = causes.next() {
            eprintln!("\nCaused by:");
            eprintln!("   0: {}", cause);
            for (i, cause) in causes.enumerate() {
                eprintln!("   {}: {}", i + 1, cause);
            }
        }
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let (config, app_dir) = handlers::load_config(cli.config.as_ref(), &cli.params)?;

    match (&cli.script, cli.list) {
        (Some(script), false) => handlers::run::handle(&config, app_dir, script),
        _ => handlers::list::handle(&config),
    }
}
