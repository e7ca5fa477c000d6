//! Error types shared across Anvil crates

use thiserror::Error;

use crate::domain::build::BuildStatus;

/// Result type alias for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Errors raised by persistence collaborators
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// An attempted build or step status change the state machine forbids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition from {from} to {to}")]
pub struct TransitionError {
    pub from: BuildStatus,
    pub to: BuildStatus,
}

/// Invalid configuration values
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);
