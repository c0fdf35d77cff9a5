//! Ephemeral auth-key provisioning
//!
//! Uses an [`tsrouter_auth::AuthenticatedClient`] to ask the Tailscale API
//! for a single-use, ephemeral, pre-authorized, tagged join key.

pub mod error;
pub mod provisioner;
pub mod record;
pub mod request;

pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::{KeyProvisioner, MAX_RESPONSE_BYTES, TAILSCALE_API_BASE};
pub use record::AuthKeyRecord;
pub use request::{AuthKeyRequest, KeyPolicy, DEFAULT_KEY_EXPIRY, DEFAULT_TAG};
