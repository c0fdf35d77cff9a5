//! Auth-key request construction
//!
//! The wire format is the Tailscale "create key" body:
//!
//! ```json
//! {
//!   "capabilities": {
//!     "devices": {
//!       "create": {
//!         "reusable": false,
//!         "ephemeral": true,
//!         "preauthorized": true,
//!         "tags": ["tag:server"]
//!       }
//!     }
//!   },
//!   "expirySeconds": 1209600
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::error::{ProvisionError, ProvisionResult};

/// Tag applied to provisioned nodes when none is configured
pub const DEFAULT_TAG: &str = "tag:server";

/// Lifetime of a provisioned key when none is configured (14 days)
pub const DEFAULT_KEY_EXPIRY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// What kind of key to ask for
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPolicy {
    pub tags: Vec<String>,
    pub expiry: Duration,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            tags: vec![DEFAULT_TAG.to_string()],
            expiry: DEFAULT_KEY_EXPIRY,
        }
    }
}

impl KeyPolicy {
    pub fn new(tags: Vec<String>, expiry: Duration) -> Self {
        Self { tags, expiry }
    }

    /// Tags must be non-empty and each of the form `tag:<name>`; the expiry
    /// is sent in whole seconds, so it must be at least one and have no
    /// fractional part
    pub fn validate(&self) -> ProvisionResult<()> {
        if self.tags.is_empty() {
            return Err(ProvisionError::Configuration(
                "at least one tag is required for a pre-authorized key".to_string(),
            ));
        }
        for tag in &self.tags {
            let name = tag.strip_prefix("tag:").unwrap_or("");
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ProvisionError::Configuration(format!(
                    "invalid tag '{}': expected 'tag:<name>'",
                    tag
                )));
            }
        }
        if self.expiry < Duration::from_secs(1) || self.expiry.subsec_nanos() != 0 {
            return Err(ProvisionError::Configuration(format!(
                "key expiry must be a whole number of seconds, at least one (got {:?})",
                self.expiry
            )));
        }
        Ok(())
    }

    /// Tags with duplicates removed, first occurrence wins
    fn unique_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCapability {
    pub reusable: bool,
    pub ephemeral: bool,
    pub preauthorized: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCapabilities {
    pub create: CreateCapability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyCapabilities {
    pub devices: DeviceCapabilities,
}

/// Body of a key-creation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthKeyRequest {
    pub capabilities: KeyCapabilities,
    pub expiry_seconds: i64,
    #[serde(skip)]
    requested_at: DateTime<Utc>,
    #[serde(skip)]
    expires_at: DateTime<Utc>,
}

impl AuthKeyRequest {
    /// Build a single-use, ephemeral, pre-authorized key request.
    ///
    /// `expires_at` and `expiry_seconds` are both derived from the one `now`
    /// passed in, so they cannot drift apart.
    pub fn new(policy: &KeyPolicy, now: DateTime<Utc>) -> ProvisionResult<Self> {
        policy.validate()?;

        let window = chrono::Duration::from_std(policy.expiry).map_err(|_| {
            ProvisionError::Configuration(format!(
                "key expiry of {:?} is out of range",
                policy.expiry
            ))
        })?;
        let expires_at = now.checked_add_signed(window).ok_or_else(|| {
            ProvisionError::Configuration(format!(
                "key expiry of {:?} is out of range",
                policy.expiry
            ))
        })?;
        let expiry_seconds = (expires_at - now).num_seconds();

        Ok(Self {
            capabilities: KeyCapabilities {
                devices: DeviceCapabilities {
                    create: CreateCapability {
                        reusable: false,
                        ephemeral: true,
                        preauthorized: true,
                        tags: policy.unique_tags(),
                    },
                },
            },
            expiry_seconds,
            requested_at: now,
            expires_at,
        })
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn tags(&self) -> &[String] {
        &self.capabilities.devices.create.tags
    }

    pub fn to_json(&self) -> ProvisionResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProvisionError::Encode)
    }
}
