//! Runner configuration
//!
//! Defines the configurable parameters for build execution: where workspaces
//! live, which container engine to drive, how long a step may run, and how
//! many builds may run at once.

use anvil_core::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runner configuration
///
/// All limits are configurable to allow tuning for different deployment
/// scenarios (laptop vs shared build host).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base directory under which per-build workspaces are created
    pub workspace_base: PathBuf,

    /// Container engine CLI (podman or docker)
    pub engine: String,

    /// Global engine flags placed before every subcommand (e.g. `--remote`)
    pub engine_args: Vec<String>,

    /// Upper bound for one step's container; `None` waits indefinitely
    pub step_timeout: Option<Duration>,

    /// Max builds executing at the same time
    pub max_parallel_builds: usize,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(workspace_base: PathBuf) -> Self {
        Self {
            workspace_base,
            engine: "podman".to_string(),
            engine_args: Vec::new(),
            step_timeout: Some(Duration::from_secs(3600)),
            max_parallel_builds: 2,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - ANVIL_WORKSPACE_BASE (default: <tmp>/anvil/workspaces)
    /// - ANVIL_CONTAINER_ENGINE (default: podman)
    /// - ANVIL_ENGINE_ARGS (whitespace separated, default: none)
    /// - ANVIL_STEP_TIMEOUT (seconds, 0 disables, default: 3600)
    /// - ANVIL_MAX_PARALLEL_BUILDS (default: 2)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("ANVIL_WORKSPACE_BASE") {
            config.workspace_base = PathBuf::from(base);
        }

        if let Ok(engine) = std::env::var("ANVIL_CONTAINER_ENGINE") {
            config.engine = engine;
        }

        if let Ok(args) = std::env::var("ANVIL_ENGINE_ARGS") {
            config.engine_args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(secs) = env_parse::<u64>("ANVIL_STEP_TIMEOUT") {
            config.step_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(n) = env_parse::<usize>("ANVIL_MAX_PARALLEL_BUILDS") {
            config.max_parallel_builds = n;
        }

        config
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace_base.as_os_str().is_empty() {
            return Err(ConfigError("workspace_base cannot be empty".into()));
        }

        if self.engine.trim().is_empty() {
            return Err(ConfigError("engine cannot be empty".into()));
        }

        if self.max_parallel_builds == 0 {
            return Err(ConfigError(
                "max_parallel_builds must be greater than 0".into(),
            ));
        }

        if self.step_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError("step_timeout must be greater than 0".into()));
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("anvil").join("workspaces"))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
