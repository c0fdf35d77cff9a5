//! Subset of `tailscale status --json`

use serde::{Deserialize, Deserializer};
use std::net::IpAddr;

use crate::error::{MeshError, MeshResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TailscaleStatus {
    #[serde(default)]
    pub backend_state: String,
    /// Empty while the daemon has no node (logged out or never started)
    #[serde(rename = "Self", default, deserialize_with = "null_as_default")]
    pub self_node: SelfNode,
    #[serde(default)]
    pub current_tailnet: Option<TailnetInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelfNode {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(rename = "DNSName", default)]
    pub dns_name: String,
    #[serde(rename = "TailscaleIPs", default, deserialize_with = "null_as_default")]
    pub tailscale_ips: Vec<IpAddr>,
    #[serde(default)]
    pub online: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TailnetInfo {
    pub name: String,
    #[serde(rename = "MagicDNSSuffix", default)]
    pub magic_dns_suffix: String,
    #[serde(rename = "MagicDNSEnabled", default)]
    pub magic_dns_enabled: bool,
}

impl TailscaleStatus {
    pub fn parse(bytes: &[u8]) -> MeshResult<Self> {
        serde_json::from_slice(bytes).map_err(MeshError::Status)
    }

    pub fn is_running(&self) -> bool {
        self.backend_state == "Running"
    }

    /// The daemon already carries a node that is up or coming up
    pub fn has_active_node(&self) -> bool {
        matches!(self.backend_state.as_str(), "Running" | "Starting")
    }
}

/// `tailscale` writes `null` for empty lists and absent nodes
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SelfNode {
    /// MagicDNS name with the trailing root dot removed
    pub fn fqdn(&self) -> Option<&str> {
        let name = self.dns_name.trim_end_matches('.');
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}
