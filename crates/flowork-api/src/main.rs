//! Flowork CLI entry point.
//!
//! Binary name: `flowork`
//!
//! Parses CLI arguments, sets up tracing, loads `flowork.toml` and dispatches
//! to the command handler.

mod cli;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use flowork_infra::config::{DEFAULT_CONFIG_FILE, load_config, load_config_strict};
use flowork_types::config::FloworkConfig;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowork", &mut std::io::stdout());
        return Ok(());
    }

    let enable_otel = matches!(&cli.command, Commands::Run(args) if args.otel);
    flowork_observe::tracing_setup::init_tracing(cli::log_filter(cli.verbose, cli.quiet), enable_otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    flowork_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let config = read_config(cli.config.as_deref()).await?;
            cli::run::run(args, config, cli.json, cli.quiet).await
        }
        Commands::Validate { workflow } => cli::validate::validate(&workflow, cli.json, cli.quiet),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

/// An explicitly named config file must load; the default one is optional.
async fn read_config(path: Option<&Path>) -> anyhow::Result<FloworkConfig> {
    match path {
        Some(path) => load_config_strict(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(load_config(Path::new(DEFAULT_CONFIG_FILE)).await),
    }
}
