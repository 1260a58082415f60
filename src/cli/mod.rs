//! # Command-Line Interface
//!
//! Defines the `clap` surface and hosts the command handlers. The grammar is
//! deliberately small: `maestro <script> [params…]` runs a script, anything
//! else (no argument, `--list`) prints the table of visible scripts.

use clap::Parser;
use std::path::PathBuf;

pub mod handlers;

/// maestro: a declarative shell-script orchestrator.
///
/// Scripts are plain shell files with a few directive tokens, grouped into
/// environments by a `.maestro.yaml` configuration. Run one by name, or call
/// with no arguments to see what is available.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Name of the script to run; omit to list available scripts.
    pub script: Option<String>,

    /// Parameters passed through to the configuration.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub params: Vec<String>,

    /// Use an explicit configuration file instead of searching upward from
    /// the working directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List all visible scripts and exit.
    #[arg(short, long)]
    pub list: bool,
}
