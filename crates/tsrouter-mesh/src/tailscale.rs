//! [`MeshNode`] backed by the `tailscale` command-line client
//!
//! Each hostname gets its own instance directory under
//! `<config_dir>/tsrouter/`, which holds the join key while `up` runs and
//! the certificate files afterwards.
//!
//! Node state lives in whichever `tailscaled` the CLI talks to. Joining
//! refuses a daemon that already has an active node, so an instance never
//! re-authenticates the host's own node or another instance's, and `leave`
//! only logs out a node this instance brought up.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tsrouter_auth::Secret;

use crate::error::{MeshError, MeshResult};
use crate::node::{JoinRequest, MeshNode, MeshSession};
use crate::status::TailscaleStatus;

pub const DEFAULT_BINARY: &str = "tailscale";

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
const AUTH_KEY_FILE: &str = "authkey";

/// `<config_dir>/tsrouter`
pub fn default_state_root() -> MeshResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("tsrouter"))
        .ok_or(MeshError::NoConfigDir)
}

/// Hostnames become a DNS label and a directory name, so both rules apply
pub fn validate_hostname(hostname: &str) -> MeshResult<()> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 63
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(MeshError::InvalidHostname(hostname.to_string()))
    }
}

pub struct TailscaleCli {
    binary: PathBuf,
    socket: Option<PathBuf>,
    state_root: PathBuf,
    timeout: Duration,
    joined: AtomicBool,
}

impl TailscaleCli {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            socket: None,
            state_root: state_root.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            joined: AtomicBool::new(false),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Talk to a specific `tailscaled` instead of the system one
    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn instance_dir(&self, hostname: &str) -> PathBuf {
        self.state_root.join(hostname)
    }

    /// Run `tailscale <args>` and return its stdout
    async fn run(&self, args: Vec<OsString>) -> MeshResult<Vec<u8>> {
        let label = match args.first() {
            Some(sub) => format!("{} {}", DEFAULT_BINARY, sub.to_string_lossy()),
            None => DEFAULT_BINARY.to_string(),
        };

        let mut command = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            command.arg("--socket").arg(socket);
        }
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %label, binary = %self.binary.display(), "Running tailscale");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MeshError::Timeout {
                command: label.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|source| MeshError::Spawn {
                command: label.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MeshError::CommandFailed {
                command: label,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    pub async fn status(&self) -> MeshResult<TailscaleStatus> {
        let stdout = self.run(vec!["status".into(), "--json".into()]).await?;
        TailscaleStatus::parse(&stdout)
    }

    async fn up(&self, hostname: &str, key_path: &Path) -> MeshResult<()> {
        let mut auth_key = OsString::from("--auth-key=file:");
        auth_key.push(key_path);

        self.run(vec![
            "up".into(),
            auth_key,
            format!("--hostname={}", hostname).into(),
        ])
        .await
        .map(|_| ())
    }

    async fn cert(&self, dns_name: &str, cert_path: &Path, key_path: &Path) -> MeshResult<()> {
        self.run(vec![
            "cert".into(),
            "--cert-file".into(),
            cert_path.into(),
            "--key-file".into(),
            key_path.into(),
            dns_name.into(),
        ])
        .await
        .map(|_| ())
    }
}

/// Write the key readable by the owner only
async fn write_auth_key(path: &Path, key: &Secret) -> MeshResult<()> {
    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path).await?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(key.expose().as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl MeshNode for TailscaleCli {
    async fn join(&self, request: JoinRequest) -> MeshResult<MeshSession> {
        validate_hostname(&request.hostname)?;

        let before = self.status().await?;
        if before.has_active_node() {
            let node = before
                .self_node
                .fqdn()
                .unwrap_or(before.self_node.host_name.as_str())
                .to_string();
            return Err(MeshError::DaemonInUse {
                node,
                state: before.backend_state,
            });
        }

        let instance_dir = self.instance_dir(&request.hostname);
        tokio::fs::create_dir_all(&instance_dir).await?;
        debug!(instance_dir = %instance_dir.display(), "Using instance directory");

        let key_file = instance_dir.join(AUTH_KEY_FILE);
        write_auth_key(&key_file, &request.auth_key).await?;

        let up = self.up(&request.hostname, &key_file).await;
        if let Err(e) = tokio::fs::remove_file(&key_file).await {
            warn!(path = %key_file.display(), "Failed to remove auth key file: {}", e);
        }
        up?;
        self.joined.store(true, Ordering::SeqCst);

        let status = self.status().await?;
        let dns_name = status
            .self_node
            .fqdn()
            .ok_or(MeshError::MissingDnsName)?
            .to_string();

        let cert_path = instance_dir.join(format!("{}.crt", dns_name));
        let key_path = instance_dir.join(format!("{}.key", dns_name));
        self.cert(&dns_name, &cert_path, &key_path).await?;

        info!(
            dns_name = %dns_name,
            addresses = ?status.self_node.tailscale_ips,
            "Joined tailnet"
        );

        Ok(MeshSession {
            hostname: request.hostname,
            dns_name,
            tailnet: status.current_tailnet.map(|t| t.name),
            addresses: status.self_node.tailscale_ips,
            instance_dir,
            cert_path,
            key_path,
        })
    }

    async fn leave(&self) -> MeshResult<()> {
        if !self.joined.swap(false, Ordering::SeqCst) {
            debug!("Not joined, nothing to leave");
            return Ok(());
        }
        self.run(vec!["logout".into()]).await?;
        info!("Left tailnet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_dir_per_hostname() {
        let cli = TailscaleCli::new("/var/lib/tsrouter");
        assert_eq!(
            cli.instance_dir("web"),
            PathBuf::from("/var/lib/tsrouter/web")
        );
        assert_ne!(cli.instance_dir("web"), cli.instance_dir("api"));
    }

    #[test]
    fn test_default_state_root() {
        if let Ok(root) = default_state_root() {
            assert!(root.ends_with("tsrouter"));
        }
    }

    #[test]
    fn test_validate_hostname() {
        let longest = "a".repeat(63);
        let too_long = "a".repeat(64);

        for ok in ["web", "web-1", "A1", longest.as_str()] {
            assert!(validate_hostname(ok).is_ok(), "{} should be valid", ok);
        }
        for bad in ["", "-web", "web-", "web.example", "../etc", "a b", too_long.as_str()] {
            assert!(
                matches!(validate_hostname(bad), Err(MeshError::InvalidHostname(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_auth_key_file_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AUTH_KEY_FILE);
        std::fs::write(&path, "stale").unwrap();

        write_auth_key(&path, &Secret::new("tskey-abc123")).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "tskey-abc123");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_leave_without_join_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TailscaleCli::new(dir.path()).with_binary(dir.path().join("no-such-tailscale"));

        assert!(cli.leave().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TailscaleCli::new(dir.path()).with_binary(dir.path().join("no-such-tailscale"));

        assert!(matches!(cli.status().await, Err(MeshError::Spawn { .. })));
    }
}
