//! Engine command handlers

use anvil_runner::PodmanRuntime;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Engine subcommands
#[derive(Subcommand)]
pub enum EngineCommands {
    /// Check that the container engine answers
    Check,
}

pub async fn handle_engine_command(command: EngineCommands, config: &Config) -> Result<()> {
    match command {
        EngineCommands::Check => check_engine(config).await,
    }
}

async fn check_engine(config: &Config) -> Result<()> {
    let runtime = PodmanRuntime::from_config(&config.runner);
    let version = runtime
        .check_available()
        .await
        .with_context(|| format!("Container engine '{}' is not usable", config.runner.engine))?;

    println!(
        "{} {} {}",
        "✓".green(),
        config.runner.engine.bold(),
        version.dimmed()
    );
    Ok(())
}
