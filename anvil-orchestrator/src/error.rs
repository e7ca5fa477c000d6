//! Orchestrator error types

use anvil_core::error::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

/// Pre-flight trigger failures, returned synchronously to the caller
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Application {0} has no configured steps")]
    NoSteps(String),

    #[error("Application {0} does not accept webhook triggers")]
    AutoTriggerDisabled(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl TriggerError {
    /// Whether the trigger input itself was bad (as opposed to storage failing)
    pub fn is_validation(&self) -> bool {
        !matches!(self, TriggerError::Repository(_))
    }
}

/// Errors from build queries and handles
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Build not found: {0}")]
    BuildNotFound(Uuid),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The build task could not be joined (runtime shutting down)
    #[error("Build worker failed: {0}")]
    Worker(String),
}
