//! Error types for the runner

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Workspace allocation failures
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The directory tree could not be created (permissions, disk full, ...)
    #[error("Failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Container engine failures
///
/// These never escape [`crate::ContainerRuntime::run`]; they are folded into
/// a failed [`crate::ContainerResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be executed at all
    #[error("Failed to execute '{engine} {subcommand}': {source}")]
    Spawn {
        engine: String,
        subcommand: String,
        #[source]
        source: std::io::Error,
    },

    /// An engine subcommand exited unsuccessfully
    #[error("'{engine} {subcommand}' failed: exit_code={exit_code}, stderr='{stderr}'")]
    Command {
        engine: String,
        subcommand: String,
        exit_code: i32,
        stderr: String,
    },

    /// The engine printed something we could not interpret
    #[error("Unexpected output from '{subcommand}': '{output}'")]
    UnexpectedOutput { subcommand: String, output: String },

    /// The container did not exit within the step timeout
    #[error("Container timed out after {0:?}")]
    Timeout(Duration),

    /// The build was cancelled while the container was running
    #[error("cancelled")]
    Cancelled,
}
