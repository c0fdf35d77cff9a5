//! Token exchange errors

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Client id or secret missing. Detected on first use of the token source.
    #[error("OAuth configuration error: {0}")]
    Configuration(String),

    /// Transport failure talking to the token endpoint or the API
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Token endpoint answered with a non-success status
    #[error("Token request rejected: HTTP {status} - {body}")]
    TokenRejected { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(#[source] serde_json::Error),
}

impl AuthError {
    /// True when the failure happened below HTTP (DNS, connect, TLS, timeout)
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e)
    }
}
