use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different --listen-port")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("No addresses to listen on")]
    NoAddresses,

    #[error("Connection to local service failed: {0}")]
    ConnectionFailed(String),

    #[error("Local service request failed: {0}")]
    Upstream(#[source] hyper::Error),

    #[error("HTTP connection error: {0}")]
    Connection(#[source] hyper::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
