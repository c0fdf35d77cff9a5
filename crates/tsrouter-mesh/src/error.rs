use thiserror::Error;

pub type MeshResult<T> = Result<T, MeshError>;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Invalid hostname '{0}': expected a DNS label (letters, digits and '-', at most 63 characters)")]
    InvalidHostname(String),

    #[error("Cannot determine the user configuration directory")]
    NoConfigDir,

    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("'{command}' did not finish within {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Failed to parse tailscale status: {0}")]
    Status(#[source] serde_json::Error),

    #[error("Node has no MagicDNS name; enable MagicDNS and HTTPS certificates for the tailnet")]
    MissingDnsName,

    #[error("tailscaled already has an active node '{node}' ({state}); point --tailscale-socket at a tailscaled dedicated to this hostname")]
    DaemonInUse { node: String, state: String },

    #[error("Join cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
