use async_trait::async_trait;
use std::net::IpAddr;
use std::path::PathBuf;
use tsrouter_auth::Secret;

use crate::error::MeshResult;

/// Everything needed to bring a node onto the tailnet
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub hostname: String,
    pub auth_key: Secret,
}

impl JoinRequest {
    pub fn new(hostname: impl Into<String>, auth_key: impl Into<Secret>) -> Self {
        Self {
            hostname: hostname.into(),
            auth_key: auth_key.into(),
        }
    }
}

/// A node that has joined the tailnet and holds a TLS certificate for its name
#[derive(Debug, Clone)]
pub struct MeshSession {
    pub hostname: String,
    /// MagicDNS name without the trailing dot, e.g. `web.example.ts.net`
    pub dns_name: String,
    pub tailnet: Option<String>,
    pub addresses: Vec<IpAddr>,
    pub instance_dir: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[async_trait]
pub trait MeshNode: Send + Sync {
    /// Join the tailnet using a pre-authorized key and fetch a certificate
    async fn join(&self, request: JoinRequest) -> MeshResult<MeshSession>;

    /// Leave the tailnet. Ephemeral nodes are removed by the provider.
    async fn leave(&self) -> MeshResult<()>;
}
