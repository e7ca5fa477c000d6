//! Anvil Fleet
//!
//! Connectivity view over the remote hosts: an SSH prober built on the system
//! OpenSSH client and a reconciler that fans probes out across the fleet and
//! writes each host's status back.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod ssh;

pub use config::FleetConfig;
pub use error::ProbeError;
pub use reconciler::{FleetReconciler, HostOutcome, RefreshSummary};
pub use ssh::{CONNECTION_TEST_COMMAND, HostProber, ProbeResult, SshProber};
