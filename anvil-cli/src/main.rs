//! Anvil CLI
//!
//! Command-line front end: runs builds and checks hosts described in an
//! inventory file.

mod commands;
mod config;
mod inventory;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anvil")]
#[command(about = "Anvil build engine and fleet checker", long_about = None)]
struct Cli {
    /// Inventory file with applications and hosts
    #[arg(long, env = "ANVIL_INVENTORY", default_value = "anvil.json")]
    inventory: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "anvil_cli=info,anvil_orchestrator=info,anvil_runner=info,anvil_fleet=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.inventory)?;

    handle_command(cli.command, &config).await
}
