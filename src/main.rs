//! Thin binary entry point: parses the CLI and dispatches into the
//! library crate. Carries no logic beyond that.

use anyhow::Result;
use clap::Parser;
use infralib_agent::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    infralib_agent::cli::dispatch(cli.command).await
}
