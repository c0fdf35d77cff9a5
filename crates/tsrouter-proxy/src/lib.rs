//! HTTPS reverse proxy from the tailnet to a local port
//!
//! TLS is terminated with the node's certificate and each request is
//! forwarded to `127.0.0.1:<target-port>` over pooled HTTP/1.1 connections.

pub mod error;
pub mod forward;
pub mod server;
pub mod tls;

pub use error::{ProxyError, ProxyResult};
pub use forward::{strip_hop_by_hop, LocalForwarder, ProxyBody};
pub use server::{listen_addrs, ProxyServer};
pub use tls::{load_certs, load_private_key, server_config};
