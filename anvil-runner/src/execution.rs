//! Execution types for the Anvil runner
//!
//! These types only exist at runtime during step execution.
//! They are not persisted.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Fixed in-container path the workspace is bind-mounted to
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Everything needed to run one step's container
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    /// Container name, unique per run
    pub name: String,
    pub image: String,
    pub commands: Vec<String>,
    /// Host directory mounted at [`WORKSPACE_MOUNT`]
    pub workspace: PathBuf,
    /// In-container working directory; relative paths resolve under the mount
    pub working_dir: String,
    pub env: BTreeMap<String, String>,
}

impl ContainerRequest {
    /// Joins the commands into one `sh -c` script
    pub fn shell_script(&self) -> String {
        self.commands.join(" && ")
    }

    /// Absolute in-container working directory
    pub fn container_working_dir(&self) -> String {
        let dir = self.working_dir.trim();
        if dir.is_empty() || dir == "." {
            WORKSPACE_MOUNT.to_string()
        } else if dir.starts_with('/') {
            dir.to_string()
        } else {
            format!("{}/{}", WORKSPACE_MOUNT, dir.trim_start_matches("./"))
        }
    }

    /// `KEY=VALUE` pairs for the engine's `-e` flag
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

/// Result of one container run
///
/// Produced by the runtime and consumed immediately by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerResult {
    pub success: bool,
    /// Combined stdout/stderr of the container
    pub output: String,
    /// Error text; empty on success
    pub error: String,
    pub exit_code: i32,
}

impl ContainerResult {
    /// Result for a container that ran to completion
    pub fn from_exit(exit_code: i32, output: String) -> Self {
        let success = exit_code == 0;
        Self {
            success,
            output,
            error: if success {
                String::new()
            } else {
                format!("Container exited with code {}", exit_code)
            },
            exit_code,
        }
    }

    /// Result for a run that could not complete (engine error, timeout, cancel)
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            exit_code: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(working_dir: &str) -> ContainerRequest {
        ContainerRequest {
            name: "anvil-test".to_string(),
            image: "alpine".to_string(),
            commands: vec!["cd src".to_string(), "make".to_string()],
            workspace: PathBuf::from("/tmp/ws"),
            working_dir: working_dir.to_string(),
            env: BTreeMap::from([
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "x=y".to_string()),
            ]),
        }
    }

    #[test]
    fn test_shell_script_chains_commands() {
        assert_eq!(request("").shell_script(), "cd src && make");
    }

    #[test]
    fn test_container_working_dir() {
        assert_eq!(request("").container_working_dir(), "/workspace");
        assert_eq!(request("/workspace").container_working_dir(), "/workspace");
        assert_eq!(request("app").container_working_dir(), "/workspace/app");
        assert_eq!(request("./app").container_working_dir(), "/workspace/app");
        assert_eq!(request("/opt").container_working_dir(), "/opt");
    }

    #[test]
    fn test_env_pairs_sorted() {
        assert_eq!(request("").env_pairs(), vec!["A=x=y", "B=2"]);
    }

    #[test]
    fn test_result_from_exit() {
        let ok = ContainerResult::from_exit(0, "done".into());
        assert!(ok.success);
        assert!(ok.error.is_empty());

        let failed = ContainerResult::from_exit(2, "oops".into());
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 2);
        assert!(failed.error.contains("code 2"));
    }

    #[test]
    fn test_result_failed() {
        let result = ContainerResult::failed("engine unreachable");
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.error, "engine unreachable");
    }
}
