//! Fleet configuration
//!
//! SSH client binaries, probe timeouts, probe parallelism and the sweep
//! interval used by `watch`.

use anvil_core::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// Fleet configuration
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// OpenSSH client binary
    pub ssh_program: String,

    /// sshpass binary, used for password authentication
    pub sshpass_program: String,

    /// Bound on establishing the SSH connection
    pub connect_timeout: Duration,

    /// Bound on the remote command once connected
    pub exec_timeout: Duration,

    /// Max probes running at the same time
    pub max_parallel_probes: usize,

    /// Time between scheduled fleet sweeps
    pub refresh_interval: Duration,
}

impl FleetConfig {
    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - ANVIL_SSH_PROGRAM (default: ssh)
    /// - ANVIL_SSHPASS_PROGRAM (default: sshpass)
    /// - ANVIL_SSH_CONNECT_TIMEOUT (seconds, default: 30)
    /// - ANVIL_SSH_EXEC_TIMEOUT (seconds, default: 300)
    /// - ANVIL_MAX_PARALLEL_PROBES (default: 10)
    /// - ANVIL_REFRESH_INTERVAL (seconds, default: 60)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(program) = std::env::var("ANVIL_SSH_PROGRAM") {
            config.ssh_program = program;
        }

        if let Ok(program) = std::env::var("ANVIL_SSHPASS_PROGRAM") {
            config.sshpass_program = program;
        }

        if let Some(secs) = env_parse::<u64>("ANVIL_SSH_CONNECT_TIMEOUT") {
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("ANVIL_SSH_EXEC_TIMEOUT") {
            config.exec_timeout = Duration::from_secs(secs);
        }

        if let Some(n) = env_parse::<usize>("ANVIL_MAX_PARALLEL_PROBES") {
            config.max_parallel_probes = n;
        }

        if let Some(secs) = env_parse::<u64>("ANVIL_REFRESH_INTERVAL") {
            config.refresh_interval = Duration::from_secs(secs);
        }

        config
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh_program.trim().is_empty() {
            return Err(ConfigError("ssh_program cannot be empty".into()));
        }

        if self.sshpass_program.trim().is_empty() {
            return Err(ConfigError("sshpass_program cannot be empty".into()));
        }

        // OpenSSH takes ConnectTimeout in whole seconds
        if self.connect_timeout.as_secs() == 0 {
            return Err(ConfigError(
                "connect_timeout must be at least one second".into(),
            ));
        }

        if self.exec_timeout.is_zero() {
            return Err(ConfigError("exec_timeout must be greater than 0".into()));
        }

        if self.max_parallel_probes == 0 {
            return Err(ConfigError(
                "max_parallel_probes must be greater than 0".into(),
            ));
        }

        if self.refresh_interval.is_zero() {
            return Err(ConfigError("refresh_interval must be greater than 0".into()));
        }

        Ok(())
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
            connect_timeout: Duration::from_secs(30),
            exec_timeout: Duration::from_secs(300),
            max_parallel_probes: 10,
            refresh_interval: Duration::from_secs(60),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
