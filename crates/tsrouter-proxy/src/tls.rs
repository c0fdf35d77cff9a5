//! Server TLS configuration from the node's certificate files

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{ProxyError, ProxyResult};

/// Load TLS certificates from a PEM file
pub fn load_certs(path: &Path) -> ProxyResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        ProxyError::TlsError(format!("Failed to open cert file {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::TlsError(format!("Failed to parse certs: {}", e)))?;

    if certs.is_empty() {
        return Err(ProxyError::TlsError(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the private key from a PEM file
pub fn load_private_key(path: &Path) -> ProxyResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        ProxyError::TlsError(format!("Failed to open key file {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ProxyError::TlsError(format!("Failed to parse key: {}", e)))?
        .ok_or_else(|| ProxyError::TlsError("No private key found".to_string()))
}

/// HTTP/1.1-only server config using the ring provider
pub fn server_config(cert_path: &Path, key_path: &Path) -> ProxyResult<Arc<ServerConfig>> {
    info!("Loading TLS certificate from: {}", cert_path.display());
    let certs = load_certs(cert_path)?;

    info!("Loading TLS private key from: {}", key_path.display());
    let key = load_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::TlsError(format!("Unsupported protocol versions: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::TlsError(format!("Invalid cert/key: {}", e)))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
