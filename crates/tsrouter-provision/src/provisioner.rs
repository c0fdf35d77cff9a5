//! Auth-key provisioning against the Tailscale API
//!
//! One `POST {api_base}/tailnet/{tailnet}/keys` per call, no retries.

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsrouter_auth::AuthenticatedClient;
use url::Url;

use crate::error::{ProvisionError, ProvisionResult};
use crate::record::AuthKeyRecord;
use crate::request::{AuthKeyRequest, KeyPolicy};

/// Tailscale API v2 base URL
pub const TAILSCALE_API_BASE: &str = "https://api.tailscale.com/api/v2";

/// Key endpoint responses are small JSON documents; anything past this is dropped
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Requests join keys for a tailnet
pub struct KeyProvisioner {
    client: AuthenticatedClient,
    api_base: String,
    policy: KeyPolicy,
}

impl KeyProvisioner {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            client,
            api_base: TAILSCALE_API_BASE.to_string(),
            policy: KeyPolicy::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    /// Key-creation URL for `tailnet`. The tailnet is encoded as one path segment.
    pub fn endpoint(&self, tailnet: &str) -> ProvisionResult<Url> {
        let tailnet = tailnet.trim();
        if tailnet.is_empty() {
            return Err(ProvisionError::Configuration(
                "tailnet name is empty".to_string(),
            ));
        }

        let mut url = Url::parse(&self.api_base).map_err(|e| {
            ProvisionError::Configuration(format!("invalid API base '{}': {}", self.api_base, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                ProvisionError::Configuration(format!(
                    "API base '{}' cannot carry a path",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .push("tailnet")
            .push(tailnet)
            .push("keys");

        Ok(url)
    }

    /// Obtain the bearer token now so bad credentials fail before the key
    /// request. The token is cached for [`provision`](Self::provision).
    pub async fn authenticate(&self, cancel: &CancellationToken) -> ProvisionResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("OAuth token request cancelled");
                Err(ProvisionError::Cancelled)
            }
            result = self.client.validate() => {
                result?;
                debug!("OAuth token test request completed");
                Ok(())
            }
        }
    }

    /// Request a new key, aborting as soon as `cancel` fires.
    ///
    /// Dropping the in-flight request on cancellation closes its connection,
    /// so nothing waits for the network timeout.
    pub async fn provision(
        &self,
        tailnet: &str,
        cancel: &CancellationToken,
    ) -> ProvisionResult<AuthKeyRecord> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Auth key request cancelled");
                Err(ProvisionError::Cancelled)
            }
            result = self.provision_once(tailnet) => result,
        }
    }

    async fn provision_once(&self, tailnet: &str) -> ProvisionResult<AuthKeyRecord> {
        let endpoint = self.endpoint(tailnet)?;
        debug!(endpoint = %endpoint, "Generating new auth key");

        let request = AuthKeyRequest::new(&self.policy, Utc::now())?;
        let body = request.to_json()?;

        debug!(
            endpoint = %endpoint,
            body = %String::from_utf8_lossy(&body),
            "Sending auth key request"
        );

        let builder = self
            .client
            .http()
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let response = self.client.execute(builder).await?;
        let status = response.status();
        let bytes = read_bounded(response, MAX_RESPONSE_BYTES).await?;

        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            debug!(
                status_code = status.as_u16(),
                endpoint = %endpoint,
                response = %body,
                "Auth key request failed"
            );
            return Err(ProvisionError::Provisioning {
                status: status.as_u16(),
                body,
            });
        }

        let record: AuthKeyRecord = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(
                endpoint = %endpoint,
                response = %String::from_utf8_lossy(&bytes),
                "Auth key response is not valid"
            );
            ProvisionError::Decode(e)
        })?;

        debug!(
            endpoint = %endpoint,
            response = %String::from_utf8_lossy(&bytes),
            "Auth key response"
        );
        info!(
            key_id = %record.id,
            expires = %record.expires,
            ephemeral = record.ephemeral,
            "Generated new auth key"
        );

        Ok(record)
    }
}

/// Read the response body, keeping at most `limit` bytes
async fn read_bounded(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = limit - body.len();
        if chunk.len() > remaining {
            body.extend_from_slice(&chunk[..remaining]);
            warn!(limit, "Auth key response exceeds size limit, truncating");
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsrouter_auth::OAuthConfig;

    fn provisioner(api_base: &str) -> KeyProvisioner {
        let client = AuthenticatedClient::new(OAuthConfig::new("abc", "xyz")).unwrap();
        KeyProvisioner::new(client).with_api_base(api_base)
    }

    #[test]
    fn test_endpoint() {
        let url = provisioner(TAILSCALE_API_BASE).endpoint("example").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.tailscale.com/api/v2/tailnet/example/keys"
        );
    }

    #[test]
    fn test_endpoint_trailing_slash_base() {
        let url = provisioner("https://api.tailscale.com/api/v2/")
            .endpoint("example.com")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.tailscale.com/api/v2/tailnet/example.com/keys"
        );
    }

    #[test]
    fn test_endpoint_encodes_tailnet_segment() {
        let url = provisioner(TAILSCALE_API_BASE)
            .endpoint("me/../admin")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.tailscale.com/api/v2/tailnet/me%2F..%2Fadmin/keys"
        );
    }

    #[test]
    fn test_endpoint_rejects_empty_tailnet() {
        let p = provisioner(TAILSCALE_API_BASE);
        assert!(matches!(
            p.endpoint(""),
            Err(ProvisionError::Configuration(_))
        ));
        assert!(matches!(
            p.endpoint("   "),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(matches!(
            provisioner("not a url").endpoint("example"),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(provisioner(TAILSCALE_API_BASE).policy(), &KeyPolicy::default());
    }
}
