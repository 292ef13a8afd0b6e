//! CLI command definitions for the `flowork` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run containerized workflows over batches of input files.
#[derive(Parser)]
#[command(name = "flowork", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ./flowork.toml. Must exist.
    #[arg(long, global = true, env = "FLOWORK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow once for every file in an input directory.
    Run(run::RunArgs),

    /// Check a workflow definition without running it.
    Validate {
        /// Path to the workflow JSON file.
        workflow: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Default log directive for the given verbosity flags.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "info,flowork_core=debug,flowork_infra=debug",
        _ => "trace",
    }
}
