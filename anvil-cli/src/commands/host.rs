//! Host command handlers
//!
//! Lists hosts, checks their connectivity, runs ad-hoc commands and watches
//! the fleet.

use anvil_core::domain::host::{Host, HostStatus};
use anvil_core::repository::{HostFilter, HostRepository, InMemoryStore};
use anvil_fleet::{FleetReconciler, HostProber, RefreshSummary, SshProber};
use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::inventory::Inventory;

/// Host subcommands
#[derive(Subcommand)]
pub enum HostCommands {
    /// List hosts in the inventory
    List,
    /// Probe one host, or every host
    Check {
        /// Host ID (all hosts when omitted)
        host: Option<String>,
    },
    /// Run a command on a host
    Exec {
        /// Host ID
        host: String,

        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Probe the fleet on an interval until interrupted
    Watch {
        /// Seconds between sweeps (defaults to ANVIL_REFRESH_INTERVAL)
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// Handle host commands
pub async fn handle_host_command(command: HostCommands, config: &Config) -> Result<()> {
    let store = Arc::new(Inventory::load(&config.inventory)?.into_store()?);

    match command {
        HostCommands::List => list_hosts(&store).await,
        HostCommands::Check { host } => check_hosts(store, config, host).await,
        HostCommands::Exec { host, command } => exec_on_host(&store, config, &host, &command).await,
        HostCommands::Watch { interval } => watch_fleet(store, config, interval).await,
    }
}

fn reconciler(store: Arc<InMemoryStore>, config: &Config) -> FleetReconciler {
    FleetReconciler::new(
        store,
        Arc::new(SshProber::new(&config.fleet)),
        config.fleet.max_parallel_probes,
    )
}

async fn list_hosts(store: &InMemoryStore) -> Result<()> {
    let hosts = store.get_hosts(&HostFilter::all()).await?;

    if hosts.is_empty() {
        println!("{}", "No hosts in inventory.".yellow());
    } else {
        println!("{}", format!("Found {} host(s):", hosts.len()).bold());
        println!();
        for host in hosts {
            print_host(&host.redacted());
        }
    }

    Ok(())
}

async fn check_hosts(store: Arc<InMemoryStore>, config: &Config, host: Option<String>) -> Result<()> {
    let filter = match &host {
        Some(id) => {
            store
                .host(id)?
                .ok_or_else(|| anyhow!("Host not found: {}", id))?;
            HostFilter::by_id(id)
        }
        None => HostFilter::all(),
    };

    let summary = reconciler(store.clone(), config).refresh_fleet(&filter).await;
    print_summary(&store, &summary)?;

    if summary.online < summary.total() {
        bail!(
            "{} of {} host(s) unreachable",
            summary.total() - summary.online,
            summary.total()
        );
    }
    Ok(())
}

async fn exec_on_host(store: &InMemoryStore, config: &Config, id: &str, command: &[String]) -> Result<()> {
    let host = store
        .host(id)?
        .ok_or_else(|| anyhow!("Host not found: {}", id))?;

    let prober = SshProber::new(&config.fleet);
    let result = prober.execute(&host, &command.join(" ")).await;

    print!("{}", result.output);
    match result.error {
        None => Ok(()),
        Some(e) => Err(e).with_context(|| format!("Command failed on {}", host.id)),
    }
}

async fn watch_fleet(store: Arc<InMemoryStore>, config: &Config, interval: Option<u64>) -> Result<()> {
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or(config.fleet.refresh_interval);
    if interval.is_zero() {
        bail!("Interval must be greater than 0");
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    println!(
        "{}",
        format!("Watching fleet every {}s (Ctrl-C to stop)", interval.as_secs()).bold()
    );
    reconciler(store, config).watch(interval, shutdown).await;
    Ok(())
}

fn print_summary(store: &InMemoryStore, summary: &RefreshSummary) -> Result<()> {
    if summary.total() == 0 {
        println!("{}", "No hosts checked.".yellow());
        return Ok(());
    }

    for outcome in &summary.outcomes {
        if let Some(host) = store.host(&outcome.host_id)? {
            print_host(&host.redacted());
        }
    }
    println!(
        "{} online, {} offline, {} error",
        summary.online.to_string().green(),
        summary.offline.to_string().red(),
        summary.error.to_string().yellow()
    );
    Ok(())
}

fn print_host(host: &Host) {
    println!("  {} Host {}", "▸".cyan(), host.id.bold());
    println!(
        "    Address:  {}@{}:{}",
        host.username, host.address, host.port
    );
    println!("    Status:   {}", colorize_status(host.status));
    if let Some(description) = &host.description {
        println!("    About:    {}", description.dimmed());
    }
    println!();
}

/// Colorize host status for display
fn colorize_status(status: HostStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        HostStatus::Online => text.green(),
        HostStatus::Offline => text.red(),
        HostStatus::Error => text.yellow(),
    }
}
