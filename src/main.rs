//! CLI entry point for magneto.

use anyhow::Result;
use clap::Parser;
use magneto_core::user_agent::tool_user_agent;
use tracing::debug;

mod cli;
mod commands;
mod terminal;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    terminal::init_tracing(cli.verbose, cli.quiet);
    debug!(?cli, agent = %tool_user_agent(), "CLI arguments parsed");

    commands::dispatch(&cli).await
}
