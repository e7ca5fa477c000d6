//! Build command handlers
//!
//! Runs a build in the foreground and prints its step records.

use anvil_core::domain::build::{Build, BuildStatus, BuildStep, TriggerOrigin};
use anvil_orchestrator::{PipelineService, TriggerRequest};
use anvil_runner::{PodmanRuntime, WorkspaceManager};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::inventory::Inventory;

/// Build subcommands
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Build an application and wait for the result
    Run {
        /// Application ID
        application: String,

        /// What caused the build (manual or webhook)
        #[arg(long, default_value = "manual")]
        origin: TriggerOrigin,

        /// Commit the build is for
        #[arg(long)]
        revision: Option<String>,
    },
}

/// Handle build commands
pub async fn handle_build_command(command: BuildCommands, config: &Config) -> Result<()> {
    match command {
        BuildCommands::Run {
            application,
            origin,
            revision,
        } => run_build(config, application, origin, revision).await,
    }
}

/// Triggers a build and follows it to completion
///
/// Ctrl-C cancels the build; the command still waits for it to wind down.
async fn run_build(
    config: &Config,
    application: String,
    origin: TriggerOrigin,
    revision: Option<String>,
) -> Result<()> {
    let store = Arc::new(Inventory::load(&config.inventory)?.into_store()?);
    let service = PipelineService::new(
        store.clone(),
        store,
        Arc::new(PodmanRuntime::from_config(&config.runner)),
        WorkspaceManager::new(&config.runner.workspace_base),
        config.runner.max_parallel_builds,
    );

    let mut request = TriggerRequest::new(&application, origin);
    request.revision = revision;

    let handle = service
        .trigger_with(request)
        .await
        .with_context(|| format!("Failed to trigger build of {}", application))?;
    let build_id = handle.build_id();

    println!(
        "{}",
        format!("Build #{} of {} queued", handle.build_number(), application).bold()
    );
    println!("  ID: {}", build_id.to_string().dimmed());
    println!();

    let interrupt = {
        let service = service.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling build {}", build_id);
                service.cancel(build_id);
            }
        })
    };

    let build = handle.wait().await?;
    interrupt.abort();

    let steps = service.steps(build_id).await?;
    for step in &steps {
        print_step(step);
    }
    print_build_result(&build);

    if build.status != BuildStatus::Success {
        bail!("Build #{} of {} ended {}", build.build_number, application, build.status);
    }
    Ok(())
}

fn print_step(step: &BuildStep) {
    println!(
        "  {} Step {} {}",
        "▸".cyan(),
        step.name.bold(),
        colorize_status(step.status)
    );
    if let Some(ms) = step.duration_ms {
        println!("    Duration: {}", format!("{}ms", ms).dimmed());
    }
    if let Some(code) = step.exit_code {
        println!("    Exit:     {}", code);
    }
    if let Some(error) = &step.error_message {
        println!("    Error:    {}", error.red());
    }
    if !step.log.trim().is_empty() {
        println!("{}", "─".repeat(80).dimmed());
        print!("{}", step.log);
        if !step.log.ends_with('\n') {
            println!();
        }
        println!("{}", "─".repeat(80).dimmed());
    }
    println!();
}

fn print_build_result(build: &Build) {
    println!(
        "Build #{}: {}",
        build.build_number,
        colorize_status(build.status)
    );
    if let Some(ms) = build.duration_ms {
        println!("  Duration: {}", format!("{}ms", ms).dimmed());
    }
    if let Some(error) = &build.error_message {
        println!("  Error:    {}", error.red());
    }
}

/// Colorize build status for display
fn colorize_status(status: BuildStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        BuildStatus::Success => text.green(),
        BuildStatus::Failed => text.red(),
        BuildStatus::Cancelled => text.yellow(),
        BuildStatus::Pending | BuildStatus::Running => text.blue(),
    }
}
