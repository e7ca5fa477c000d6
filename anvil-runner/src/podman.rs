//! Podman container management
//!
//! Handles container lifecycle for step execution:
//! - Checking engine availability
//! - Creating a one-shot container per step with the workspace mounted
//! - Waiting for exit (bounded by the step timeout, interruptible by cancel)
//! - Capturing combined output
//! - Force-removing the container on every exit path

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::EngineError;
use crate::execution::{ContainerRequest, ContainerResult, WORKSPACE_MOUNT};

/// Runs one step's container to completion
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Executes the request and always cleans up the container
    ///
    /// Never fails: engine errors, timeouts and cancellation come back as a
    /// result with `success = false` and `exit_code = -1`.
    async fn run(&self, request: &ContainerRequest, cancel: &CancellationToken) -> ContainerResult;
}

/// Container runtime backed by the podman (or docker) command line
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    engine: String,
    engine_args: Vec<String>,
    step_timeout: Option<Duration>,
}

impl PodmanRuntime {
    /// Creates a runtime
    ///
    /// # Arguments
    /// * `engine` - Engine binary (e.g. `podman`, `docker`)
    /// * `engine_args` - Global flags placed before every subcommand
    /// * `step_timeout` - Upper bound for waiting on a container to exit
    pub fn new(engine: impl Into<String>, engine_args: Vec<String>, step_timeout: Option<Duration>) -> Self {
        Self {
            engine: engine.into(),
            engine_args,
            step_timeout,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.engine.clone(),
            config.engine_args.clone(),
            config.step_timeout,
        )
    }

    /// Checks that the engine is installed and answering
    ///
    /// # Returns
    /// The engine's version string
    pub async fn check_available(&self) -> Result<String, EngineError> {
        let output = self.output("--version", self.command(&["--version"])).await?;
        let version = output.trim().to_string();
        info!("{} is available: {}", self.engine, version);
        Ok(version)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.engine);
        command
            .args(&self.engine_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Runs an engine command, returning stdout on success
    async fn output(&self, subcommand: &str, mut command: Command) -> Result<String, EngineError> {
        let output = command.output().await.map_err(|source| EngineError::Spawn {
            engine: self.engine.clone(),
            subcommand: subcommand.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.engine, subcommand, stderr.trim());
        }

        if !output.status.success() {
            return Err(EngineError::Command {
                engine: self.engine.clone(),
                subcommand: subcommand.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Creates the container and returns its id
    async fn create(&self, request: &ContainerRequest) -> Result<String, EngineError> {
        let mount = format!("{}:{}", request.workspace.display(), WORKSPACE_MOUNT);
        let working_dir = request.container_working_dir();
        let script = request.shell_script();

        let mut args: Vec<&str> = vec![
            "create",
            "--name",
            &request.name,
            // Override any image entrypoint (e.g. alpine/git) so the script runs under sh
            "--entrypoint",
            "/bin/sh",
            "-v",
            &mount,
            "-w",
            &working_dir,
        ];

        let env_pairs = request.env_pairs();
        for pair in &env_pairs {
            args.push("-e");
            args.push(pair);
        }

        args.push(&request.image);
        args.push("-c");
        args.push(&script);

        debug!(
            "Creating container {} from {} with script: {}",
            request.name, request.image, script
        );

        let stdout = self.output("create", self.command(&args)).await?;
        last_line(&stdout).ok_or_else(|| EngineError::UnexpectedOutput {
            subcommand: "create".to_string(),
            output: stdout.clone(),
        })
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.output("start", self.command(&["start", id])).await?;
        Ok(())
    }

    /// Blocks until the container exits and returns its exit code
    async fn wait(&self, id: &str) -> Result<i32, EngineError> {
        let wait = self.output("wait", self.command(&["wait", id]));

        let stdout = match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| EngineError::Timeout(limit))??,
            None => wait.await?,
        };

        last_line(&stdout)
            .and_then(|line| line.parse::<i32>().ok())
            .ok_or_else(|| EngineError::UnexpectedOutput {
                subcommand: "wait".to_string(),
                output: stdout.clone(),
            })
    }

    /// Fetches the container's combined stdout and stderr
    async fn logs(&self, id: &str) -> Result<String, EngineError> {
        let output = self
            .command(&["logs", id])
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                engine: self.engine.clone(),
                subcommand: "logs".to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    /// Force-removes a container, stopping it if still running
    async fn remove(&self, id: &str) {
        match self.output("rm", self.command(&["rm", "-f", id])).await {
            Ok(_) => debug!("Container {} removed", id),
            Err(e) => warn!("Failed to remove container {}: {}", id, e),
        }
    }

    async fn execute(
        &self,
        request: &ContainerRequest,
        cancel: &CancellationToken,
        guard: &mut ContainerGuard,
    ) -> Result<ContainerResult, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let id = self.create(request).await?;
        guard.arm(id.clone());
        info!("Container {} created with ID: {}", request.name, id);

        self.start(&id).await?;

        let exit_code = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancellation requested, stopping container {}", request.name);
                return Err(EngineError::Cancelled);
            }
            code = self.wait(&id) => code?,
        };

        let output = self.logs(&id).await.unwrap_or_else(|e| {
            warn!("Failed to fetch logs for container {}: {}", id, e);
            String::new()
        });

        if exit_code == 0 {
            debug!(
                "Container {} completed successfully: output_len={}",
                request.name,
                output.len()
            );
        } else {
            debug!(
                "Container {} failed: exit_code={} output='{}'",
                request.name,
                exit_code,
                output.trim()
            );
        }

        Ok(ContainerResult::from_exit(exit_code, output))
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn run(&self, request: &ContainerRequest, cancel: &CancellationToken) -> ContainerResult {
        info!(
            "Running container {} with image {}",
            request.name, request.image
        );

        let mut guard = ContainerGuard::new(self.engine.clone(), self.engine_args.clone());

        let result = match self.execute(request, cancel, &mut guard).await {
            Ok(result) => result,
            Err(EngineError::Cancelled) => ContainerResult::failed("cancelled"),
            Err(e) => {
                error!("Container {} failed to run: {}", request.name, e);
                ContainerResult::failed(e.to_string())
            }
        };

        if let Some(id) = guard.disarm() {
            self.remove(&id).await;
        }

        result
    }
}

/// Removes a created container if the run future is dropped before the
/// explicit removal (task aborted, panic)
struct ContainerGuard {
    engine: String,
    engine_args: Vec<String>,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(engine: String, engine_args: Vec<String>) -> Self {
        Self {
            engine,
            engine_args,
            id: None,
        }
    }

    fn arm(&mut self, id: String) {
        self.id = Some(id);
    }

    fn disarm(&mut self) -> Option<String> {
        self.id.take()
    }
}

impl Drop for ContainerGuard {
    /// Only reached when the run future is aborted or panics; the normal paths
    /// remove the container themselves and disarm the guard first.
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        warn!("Container {} still present on drop, force-removing", id);

        let mut command = std::process::Command::new(&self.engine);
        command
            .args(&self.engine_args)
            .args(["rm", "-f", &id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut remove = move || {
            if let Err(e) = command.status() {
                warn!("Failed to remove container {} on drop: {}", id, e);
            }
        };

        // Keep the blocking call off the async workers when a runtime is around
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn last_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}
