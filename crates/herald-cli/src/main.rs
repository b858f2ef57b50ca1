mod bootstrap_helpers;
mod cli_args;
mod commands;
mod template_handler;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::commands::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(manifest = %cli.manifest.display(), "herald starting");
    run_cli(cli).await
}
