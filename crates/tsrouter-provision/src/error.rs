//! Auth-key provisioning errors
//!
//! None of these are retried. The caller is expected to abort startup,
//! since a mesh node cannot join without a key.

use thiserror::Error;
use tsrouter_auth::AuthError;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Bad input detected before any request was sent (empty tailnet, bad tags, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// DNS, connect, TLS or timeout failure reaching the token or key endpoint
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Token endpoint refused the client credentials or answered garbage
    #[error("Authentication failed: {0}")]
    Authentication(#[source] AuthError),

    /// Key endpoint answered with a status other than 200
    #[error("Failed to generate auth key: HTTP {status} - {body}")]
    Provisioning { status: u16, body: String },

    /// Key endpoint answered 200 with a body that is not an auth key
    #[error("Failed to decode auth key response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode auth key request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Auth key request cancelled")]
    Cancelled,
}

impl ProvisionError {
    /// HTTP status of a rejected key request
    pub fn status(&self) -> Option<u16> {
        match self {
            ProvisionError::Provisioning { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<AuthError> for ProvisionError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Network(source) => ProvisionError::Network(source),
            other => ProvisionError::Authentication(other),
        }
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(e: reqwest::Error) -> Self {
        ProvisionError::Network(e)
    }
}
