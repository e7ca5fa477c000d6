//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod build;
mod engine;
mod host;

pub use build::BuildCommands;
pub use engine::EngineCommands;
pub use host::HostCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build execution
    Build {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Fleet connectivity
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },
    /// Container engine diagnostics
    Engine {
        #[command(subcommand)]
        command: EngineCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// Result indicating success or failure
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Build { command } => build::handle_build_command(command, config).await,
        Commands::Host { command } => host::handle_host_command(command, config).await,
        Commands::Engine { command } => engine::handle_engine_command(command, config).await,
    }
}
