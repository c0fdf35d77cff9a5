//! HTTP client that authenticates every request with a bearer token

use std::sync::Arc;
use std::time::Duration;

use crate::error::AuthResult;
use crate::oauth::{OAuthConfig, TokenSource};

/// Build the underlying HTTP client with a bounded request timeout
pub fn build_http_client(timeout: Duration) -> AuthResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tsrouter/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// HTTP client bound to a [`TokenSource`]
///
/// Requests are built with [`AuthenticatedClient::http`] and sent through
/// [`AuthenticatedClient::execute`], which attaches the current bearer token.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl AuthenticatedClient {
    /// Create a client for the given credentials.
    ///
    /// No token is requested here; bad credentials surface on first use
    /// or through [`AuthenticatedClient::validate`].
    pub fn new(config: OAuthConfig) -> AuthResult<Self> {
        let http = build_http_client(config.timeout)?;
        let tokens = Arc::new(TokenSource::new(config, http.clone()));
        Ok(Self { http, tokens })
    }

    pub fn with_token_source(http: reqwest::Client, tokens: Arc<TokenSource>) -> Self {
        Self { http, tokens }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn token_source(&self) -> &TokenSource {
        &self.tokens
    }

    /// Eagerly exchange credentials for a token
    pub async fn validate(&self) -> AuthResult<()> {
        self.tokens.validate().await
    }

    /// Attach the bearer token and send the request
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> AuthResult<reqwest::Response> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token.secret().expose()).send().await?;
        Ok(response)
    }
}
