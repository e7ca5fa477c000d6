//! SSH host probing
//!
//! Drives the system OpenSSH client, one short-lived process per probe:
//! - Key authentication writes the key to a private temp file for `-i`
//! - Password authentication runs the client under `sshpass -e`, with the
//!   password in the `SSHPASS` environment variable
//! - The client enforces the connect timeout; the whole process is bounded by
//!   connect + exec timeout and killed when that runs out
//!
//! Host keys are not verified. Every probe accepts whatever key the host
//! presents and records nothing in `known_hosts`, so probes are open to
//! man-in-the-middle interception.

use anvil_core::domain::host::{Host, HostCredential, HostStatus};
use anvil_core::domain::secret::Secret;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::config::FleetConfig;
use crate::error::ProbeError;

/// Side-effect-free command used for connectivity checks
pub const CONNECTION_TEST_COMMAND: &str = "echo 'connection test'";

/// Outcome of one remote command
#[derive(Debug)]
pub struct ProbeResult {
    pub success: bool,
    /// Remote stdout
    pub output: String,
    pub error: Option<ProbeError>,
    /// Remote exit code, -1 when the command never ran
    pub exit_code: i32,
}

impl ProbeResult {
    pub fn ok(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
            exit_code: 0,
        }
    }

    pub fn failed(error: ProbeError) -> Self {
        Self {
            success: false,
            output: String::new(),
            exit_code: error.exit_code(),
            error: Some(error),
        }
    }

    /// Status a host gets from this result
    pub fn host_status(&self) -> HostStatus {
        if self.success {
            return HostStatus::Online;
        }
        self.error
            .as_ref()
            .map(ProbeError::host_status)
            .unwrap_or(HostStatus::Offline)
    }
}

/// Runs commands on hosts
#[async_trait]
pub trait HostProber: Send + Sync {
    /// Runs `command` on the host
    ///
    /// Never fails: every problem comes back as an unsuccessful result.
    async fn execute(&self, host: &Host, command: &str) -> ProbeResult;

    /// Bare connectivity check
    async fn probe(&self, host: &Host) -> ProbeResult {
        self.execute(host, CONNECTION_TEST_COMMAND).await
    }
}

/// Credential chosen for a session
#[derive(Debug, Clone, Copy)]
enum Auth<'a> {
    PrivateKey(&'a Secret),
    Password(&'a Secret),
}

/// Picks the credential to use: a non-blank key wins over a non-blank password
fn select_auth(credential: &HostCredential) -> Option<Auth<'_>> {
    usable(&credential.private_key)
        .map(Auth::PrivateKey)
        .or_else(|| usable(&credential.password).map(Auth::Password))
}

fn usable(secret: &Option<Secret>) -> Option<&Secret> {
    secret.as_ref().filter(|s| !s.is_blank())
}

/// Prober backed by the OpenSSH command line client
#[derive(Debug, Clone)]
pub struct SshProber {
    ssh_program: String,
    sshpass_program: String,
    connect_timeout: Duration,
    exec_timeout: Duration,
}

impl SshProber {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            ssh_program: config.ssh_program.clone(),
            sshpass_program: config.sshpass_program.clone(),
            connect_timeout: config.connect_timeout,
            exec_timeout: config.exec_timeout,
        }
    }

    /// Client arguments for one session
    ///
    /// `key_path` selects key authentication; without it the session is set
    /// up for a single password attempt.
    fn ssh_args(&self, host: &Host, key_path: Option<&Path>, command: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let mut option = |value: String| {
            args.push("-o".to_string());
            args.push(value);
        };

        option("StrictHostKeyChecking=no".into());
        option("UserKnownHostsFile=/dev/null".into());
        option("LogLevel=ERROR".into());
        option(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)));
        option("ServerAliveInterval=15".into());
        option("ServerAliveCountMax=3".into());

        match key_path {
            Some(_) => {
                option("BatchMode=yes".into());
                option("IdentitiesOnly=yes".into());
                option("PasswordAuthentication=no".into());
            }
            None => {
                option("PreferredAuthentications=password,keyboard-interactive".into());
                option("PubkeyAuthentication=no".into());
                option("NumberOfPasswordPrompts=1".into());
            }
        }

        if let Some(path) = key_path {
            args.push("-i".to_string());
            args.push(path.display().to_string());
        }
        args.push("-p".to_string());
        args.push(host.port.to_string());
        args.push("--".to_string());
        args.push(format!("{}@{}", host.username, host.address));
        args.push(command.to_string());
        args
    }

    async fn run(&self, host: &Host, command: &str) -> ProbeResult {
        let Some(auth) = select_auth(&host.credential) else {
            return ProbeResult::failed(ProbeError::MissingCredential(host.id.clone()));
        };

        // Deleted on drop, so it must outlive the client process
        let mut key_file: Option<NamedTempFile> = None;

        let (mut cmd, program, password_auth) = match auth {
            Auth::PrivateKey(key) => {
                let file = match stage_private_key(key) {
                    Ok(file) => file,
                    Err(e) => return ProbeResult::failed(e),
                };
                let mut cmd = Command::new(&self.ssh_program);
                cmd.args(self.ssh_args(host, Some(file.path()), command));
                key_file = Some(file);
                (cmd, self.ssh_program.as_str(), false)
            }
            Auth::Password(password) => {
                let mut cmd = Command::new(&self.sshpass_program);
                cmd.arg("-e")
                    .arg(&self.ssh_program)
                    .args(self.ssh_args(host, None, command))
                    .env("SSHPASS", password.expose());
                (cmd, self.sshpass_program.as_str(), true)
            }
        };

        debug!(
            "Running '{}' on {}@{}:{} via {}",
            command, host.username, host.address, host.port, program
        );

        let limit = self.connect_timeout + self.exec_timeout;
        let outcome = run_bounded(&mut cmd, program, limit).await;
        drop(key_file);

        match outcome {
            Ok(output) => interpret(&output, password_auth, self.connect_timeout),
            Err(ProbeError::ExecTimeout(_)) => {
                ProbeResult::failed(ProbeError::ExecTimeout(self.exec_timeout))
            }
            Err(e) => ProbeResult::failed(e),
        }
    }
}

#[async_trait]
impl HostProber for SshProber {
    async fn execute(&self, host: &Host, command: &str) -> ProbeResult {
        let result = self.run(host, command).await;
        if let Some(e) = &result.error {
            debug!("Command on host {} failed: {}", host.id, e);
        }
        result
    }
}

/// Writes the key to a temp file readable only by the current user
fn stage_private_key(key: &Secret) -> Result<NamedTempFile, ProbeError> {
    let mut file = tempfile::Builder::new()
        .prefix("anvil-key-")
        .tempfile()
        .map_err(ProbeError::KeyMaterial)?;

    // OpenSSH rejects key files without a trailing newline
    let mut material = key.expose().trim_end().to_string();
    material.push('\n');
    file.write_all(material.as_bytes())
        .and_then(|_| file.flush())
        .map_err(ProbeError::KeyMaterial)?;

    Ok(file)
}

/// Spawns the command and waits at most `limit` for it
///
/// The child is killed if the limit runs out.
async fn run_bounded(cmd: &mut Command, program: &str, limit: Duration) -> Result<Output, ProbeError> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProbeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ProbeError::Connection(format!(
            "failed to collect {} output: {}",
            program, e
        ))),
        Err(_) => Err(ProbeError::ExecTimeout(limit)),
    }
}

fn interpret(output: &Output, password_auth: bool, connect_timeout: Duration) -> ProbeResult {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        return ProbeResult::ok(stdout);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let error = classify_failure(exit_code, stderr, password_auth, connect_timeout);

    ProbeResult {
        success: false,
        output: stdout,
        exit_code,
        error: Some(error),
    }
}

/// Maps a non-zero client exit to a probe error
///
/// OpenSSH exits 255 for its own failures; anything else is the remote
/// command's exit code. sshpass exits 5 for a rejected password.
fn classify_failure(exit_code: i32, stderr: String, password_auth: bool, connect_timeout: Duration) -> ProbeError {
    if password_auth && exit_code == 5 {
        return ProbeError::Authentication("password rejected".to_string());
    }

    if exit_code != 255 {
        return ProbeError::CommandFailed { exit_code, stderr };
    }

    let lower = stderr.to_lowercase();
    if lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        ProbeError::Authentication(stderr)
    } else if lower.contains("timed out") {
        ProbeError::ConnectTimeout(connect_timeout)
    } else if stderr.is_empty() {
        ProbeError::Connection("ssh exited with code 255".to_string())
    } else {
        ProbeError::Connection(stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prober(ssh: &str, sshpass: &str) -> SshProber {
        SshProber::new(&FleetConfig {
            ssh_program: ssh.to_string(),
            sshpass_program: sshpass.to_string(),
            ..FleetConfig::default()
        })
    }

    const MISSING: &str = "/nonexistent/anvil-test-client";

    #[test]
    fn test_select_auth_precedence() {
        let both = Host::new("H", "h", "u").with_password("pw").with_private_key("KEY");
        assert!(matches!(select_auth(&both.credential), Some(Auth::PrivateKey(_))));

        let blank_key = Host::new("H", "h", "u").with_password("pw").with_private_key("  ");
        assert!(matches!(select_auth(&blank_key.credential), Some(Auth::Password(_))));

        let blank_both = Host::new("H", "h", "u").with_password("").with_private_key("\n");
        assert!(select_auth(&blank_both.credential).is_none());

        assert!(select_auth(&HostCredential::default()).is_none());
    }

    #[test]
    fn test_ssh_args() {
        let mut host = Host::new("H1", "10.0.0.5", "deploy").with_password("hunter2");
        host.port = 2222;
        let p = prober("ssh", "sshpass");

        let args = p.ssh_args(&host, None, CONNECTION_TEST_COMMAND);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert!(args.contains(&"NumberOfPasswordPrompts=1".to_string()));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(!args.contains(&"-i".to_string()));
        let tail = &args[args.len() - 4..];
        assert_eq!(tail, ["2222", "--", "deploy@10.0.0.5", "echo 'connection test'"]);

        let args = p.ssh_args(&host, Some(Path::new("/tmp/key")), "uptime");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/tmp/key");
    }

    #[test]
    fn test_classify_failure() {
        let timeout = Duration::from_secs(30);

        let e = classify_failure(255, "user@h: Permission denied (publickey).".into(), false, timeout);
        assert!(matches!(e, ProbeError::Authentication(_)));

        let e = classify_failure(255, "ssh: connect to host h port 22: Connection timed out".into(), false, timeout);
        assert!(matches!(e, ProbeError::ConnectTimeout(d) if d == timeout));

        let e = classify_failure(255, "ssh: Could not resolve hostname nowhere".into(), false, timeout);
        assert!(matches!(e, ProbeError::Connection(_)));

        let e = classify_failure(5, String::new(), true, timeout);
        assert!(matches!(e, ProbeError::Authentication(_)));

        let e = classify_failure(5, String::new(), false, timeout);
        assert!(matches!(e, ProbeError::CommandFailed { exit_code: 5, .. }));
    }

    #[test]
    fn test_probe_result_status() {
        assert_eq!(ProbeResult::ok(String::new()).host_status(), HostStatus::Online);
        assert_eq!(
            ProbeResult::failed(ProbeError::MissingCredential("H".into())).host_status(),
            HostStatus::Error
        );
        assert_eq!(
            ProbeResult::failed(ProbeError::ExecTimeout(Duration::from_secs(1))).host_status(),
            HostStatus::Offline
        );
    }

    #[tokio::test]
    async fn test_missing_credential_skips_client() {
        // A spawn attempt would surface as Spawn, not MissingCredential
        let p = prober(MISSING, MISSING);
        let host = Host::new("H1", "10.0.0.1", "root").with_password("   ");

        let result = p.probe(&host).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(matches!(result.error, Some(ProbeError::MissingCredential(ref id)) if id == "H1"));
        assert_eq!(result.host_status(), HostStatus::Error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_auth_uses_ssh_directly() {
        let p = prober("true", MISSING);
        let host = Host::new("H1", "10.0.0.1", "root")
            .with_private_key("-----BEGIN KEY-----")
            .with_password("pw");

        let result = p.probe(&host).await;
        assert!(result.success);
        assert_eq!(result.host_status(), HostStatus::Online);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_password_auth_goes_through_sshpass() {
        let p = prober(MISSING, "true");
        let host = Host::new("H1", "10.0.0.1", "root").with_password("pw");
        assert!(p.probe(&host).await.success);

        let p = prober("true", MISSING);
        let result = p.probe(&host).await;
        assert!(matches!(result.error, Some(ProbeError::Spawn { .. })));
        assert_eq!(result.host_status(), HostStatus::Error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_failure_is_offline() {
        let p = prober("false", MISSING);
        let host = Host::new("H1", "10.0.0.1", "root").with_private_key("KEY");

        let result = p.probe(&host).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert!(matches!(result.error, Some(ProbeError::CommandFailed { exit_code: 1, .. })));
        assert_eq!(result.host_status(), HostStatus::Offline);
    }

    /// Password-mode prober whose client is a shell script
    ///
    /// `sh` stands in for sshpass, so `sh -e <script> <ssh args>` runs the
    /// script in place of the ssh client.
    #[cfg(unix)]
    fn scripted_client(dir: &tempfile::TempDir, script: &str) -> SshProber {
        let path = dir.path().join("ssh.sh");
        std::fs::write(&path, script).unwrap();
        prober(&path.to_string_lossy(), "sh")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_failures_map_to_host_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let host = Host::new("H1", "10.0.0.1", "root").with_password("pw");

        let p = scripted_client(
            &dir,
            "echo 'ssh: connect to host 10.0.0.1 port 22: Connection timed out' >&2\nexit 255\n",
        );
        let result = p.probe(&host).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 255);
        assert!(matches!(result.error, Some(ProbeError::ConnectTimeout(d)) if d == Duration::from_secs(30)));
        assert_eq!(result.host_status(), HostStatus::Offline);

        let p = scripted_client(
            &dir,
            "echo 'ssh: connect to host 10.0.0.1 port 22: Connection refused' >&2\nexit 255\n",
        );
        let result = p.probe(&host).await;
        assert!(matches!(result.error, Some(ProbeError::Connection(ref m)) if m.contains("refused")));
        assert_eq!(result.host_status(), HostStatus::Offline);

        let p = scripted_client(&dir, "echo 'root@10.0.0.1: Permission denied (password).' >&2\nexit 255\n");
        let result = p.probe(&host).await;
        assert!(matches!(result.error, Some(ProbeError::Authentication(_))));
        assert_eq!(result.host_status(), HostStatus::Offline);

        let p = scripted_client(&dir, "exit 5\n");
        let result = p.probe(&host).await;
        assert!(matches!(result.error, Some(ProbeError::Authentication(_))));
        assert_eq!(result.host_status(), HostStatus::Offline);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_receives_remote_command() {
        let dir = tempfile::TempDir::new().unwrap();
        // The remote command is the last argument
        let p = scripted_client(&dir, "for arg; do last=$arg; done\necho \"ran: $last\"\n");
        let host = Host::new("H1", "10.0.0.1", "root").with_password("pw");

        let result = p.execute(&host, "uptime").await;
        assert!(result.success);
        assert_eq!(result.output, "ran: uptime\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_bounded_kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = std::time::Instant::now();

        let err = run_bounded(&mut cmd, "sleep", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::ExecTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let file = stage_private_key(&Secret::new("KEY DATA")).unwrap();
        let path = file.path().to_path_buf();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEY DATA\n");

        drop(file);
        assert!(!path.exists());
    }
}
