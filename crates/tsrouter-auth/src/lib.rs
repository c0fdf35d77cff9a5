//! OAuth client-credentials exchange for the Tailscale API
//!
//! Produces an [`AuthenticatedClient`] whose requests carry a bearer token
//! that is obtained lazily and refreshed before it expires.

pub mod client;
pub mod error;
pub mod oauth;
pub mod secret;

pub use client::{build_http_client, AuthenticatedClient};
pub use error::{AuthError, AuthResult};
pub use oauth::{
    AccessToken, OAuthConfig, TokenResponse, TokenSource, DEFAULT_REFRESH_THRESHOLD,
    DEFAULT_REQUEST_TIMEOUT, TAILSCALE_TOKEN_URL,
};
pub use secret::{obscure, Secret};
