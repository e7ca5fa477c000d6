//! Anvil Runner
//!
//! Executes build steps in containers and manages per-build workspaces.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Execution: Runtime-only request/result types for one step container
//! - Podman: Container lifecycle (create, start, wait, logs, force-remove)
//! - Workspace: Per-build scratch directories with guaranteed purge

pub mod config;
pub mod error;
pub mod execution;
pub mod podman;
pub mod workspace;

pub use config::RunnerConfig;
pub use error::{EngineError, WorkspaceError};
pub use execution::{ContainerRequest, ContainerResult, WORKSPACE_MOUNT};
pub use podman::{ContainerRuntime, PodmanRuntime};
pub use workspace::{Workspace, WorkspaceManager};
