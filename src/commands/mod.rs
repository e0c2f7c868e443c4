//! CLI command handlers.

mod inspect;
mod parse;
mod search;
mod verify;

use anyhow::{Context, Result};
use magneto_core::SearchConfig;

use crate::cli::{Cli, Command, QueryCommand};

pub use inspect::{run_json2xml_command, run_xpath_command};
pub use parse::run_parse_command;
pub use search::run_search_command;
pub use verify::run_verify_command;

/// Runs the selected subcommand.
pub async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Search(args) => run_search_command(&load_config(cli, Some(args))?, args).await,
        Command::Parse(args) => run_parse_command(&load_config(cli, Some(args))?, args).await,
        Command::Verify => run_verify_command(&load_config(cli, None)?),
        Command::Xpath(args) => run_xpath_command(args).await,
        Command::Json2xml { path } => run_json2xml_command(path).await,
    }
}

/// Config file values, then global and per-command flag overrides.
fn load_config(cli: &Cli, query: Option<&QueryCommand>) -> Result<SearchConfig> {
    let mut config = SearchConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(providers) = &cli.providers {
        config.providers_path = Some(providers.clone());
    }
    if let Some(query) = query {
        if let Some(threads) = query.threads {
            config.threads = usize::from(threads);
        }
        if let Some(timeout) = query.timeout {
            config.timeout_secs = timeout;
        }
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
