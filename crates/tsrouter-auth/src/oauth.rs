//! OAuth 2.0 client-credentials exchange
//!
//! The exchange is lazy: building a [`TokenSource`] performs no I/O and never
//! fails on bad credentials. The first call to [`TokenSource::token`] (or an
//! explicit [`TokenSource::validate`]) talks to the token endpoint and caches
//! the result until it comes within the refresh threshold of its expiry.

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};
use crate::secret::Secret;

/// Tailscale OAuth token endpoint
pub const TAILSCALE_TOKEN_URL: &str = "https://api.tailscale.com/api/v2/oauth/token";

/// Refresh the cached token when less than this much lifetime is left
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Upper bound for any single HTTP round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth client-credentials configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub token_url: String,
    /// Scopes requested with the grant. Empty means whatever the client was issued with.
    pub scopes: Vec<String>,
    pub refresh_threshold: Duration,
    pub timeout: Duration,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: TAILSCALE_TOKEN_URL.to_string(),
            scopes: Vec::new(),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn check(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration("client id is empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::Configuration(
                "client secret is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A bearer token together with its absolute expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: Secret,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn from_response(response: TokenResponse, received_at: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| received_at + chrono::Duration::seconds(secs as i64));

        Self {
            value: response.access_token,
            token_type: response.token_type,
            expires_at,
        }
    }

    pub fn secret(&self) -> &Secret {
        &self.value
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token expires within `threshold` of `now`.
    /// Tokens without an expiry never need a refresh.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.expires_at {
            Some(exp) => {
                let threshold =
                    chrono::Duration::from_std(threshold).unwrap_or(chrono::TimeDelta::MAX);
                now.checked_add_signed(threshold)
                    .map(|t| t >= exp)
                    .unwrap_or(true)
            }
            None => false,
        }
    }
}

/// Lazily-initialized, self-refreshing source of bearer tokens
pub struct TokenSource {
    config: OAuthConfig,
    http: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Return a valid token, exchanging credentials if none is cached or the
    /// cached one is about to expire. Concurrent callers share one exchange.
    pub async fn token(&self) -> AuthResult<AccessToken> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh_at(Utc::now(), self.config.refresh_threshold) {
                return Ok(token.clone());
            }
            debug!("Access token expires soon, refreshing");
        }

        let token = self.exchange().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Perform the exchange now so bad credentials fail early.
    /// The resulting token is cached for later requests.
    pub async fn validate(&self) -> AuthResult<()> {
        self.token().await.map(|_| ())
    }

    async fn exchange(&self) -> AuthResult<AccessToken> {
        self.config.check()?;

        debug!(
            token_url = %self.config.token_url,
            client_id = %self.config.client_id,
            client_secret = %self.config.client_secret,
            "Requesting OAuth access token"
        );

        let scope = self.config.scopes.join(" ");
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose()),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), response = %body, "Token request failed");
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(AuthError::InvalidTokenResponse)?;
        let token = AccessToken::from_response(parsed, Utc::now());

        info!(
            expires_at = ?token.expires_at(),
            "Obtained OAuth access token"
        );
        Ok(token)
    }
}
