//! Joining the tailnet
//!
//! [`MeshNode`] is the seam between key provisioning and the mesh runtime.
//! [`TailscaleCli`] drives a local `tailscaled` through the `tailscale` CLI.

pub mod error;
pub mod node;
pub mod status;
pub mod tailscale;

pub use error::{MeshError, MeshResult};
pub use node::{JoinRequest, MeshNode, MeshSession};
pub use status::{SelfNode, TailnetInfo, TailscaleStatus};
pub use tailscale::{default_state_root, validate_hostname, TailscaleCli, DEFAULT_BINARY};
