//! Probe error types

use anvil_core::domain::host::HostStatus;
use std::time::Duration;
use thiserror::Error;

/// Why a probe (or remote command) did not succeed
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Neither a private key nor a password is configured
    #[error("Host {0} has no SSH credentials configured")]
    MissingCredential(String),

    /// The private key could not be staged for the ssh client
    #[error("Failed to prepare private key: {0}")]
    KeyMaterial(#[source] std::io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Command timed out after {0:?}")]
    ExecTimeout(Duration),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },
}

impl ProbeError {
    /// Host status implied by this failure
    ///
    /// Problems on our side (credentials, key files, the client binary)
    /// mark the host `ERROR`; anything that reached the network is `OFFLINE`.
    pub fn host_status(&self) -> HostStatus {
        match self {
            ProbeError::MissingCredential(_) | ProbeError::KeyMaterial(_) | ProbeError::Spawn { .. } => {
                HostStatus::Error
            }
            _ => HostStatus::Offline,
        }
    }

    /// Exit code reported alongside this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeError::CommandFailed { exit_code, .. } => *exit_code,
            _ => -1,
        }
    }
}
