//! TLS listener serving the reverse proxy

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use rustls::ServerConfig;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::forward::LocalForwarder;

const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One socket address per node address, all on `port`
pub fn listen_addrs(addresses: &[IpAddr], port: u16) -> Vec<SocketAddr> {
    addresses
        .iter()
        .map(|ip| SocketAddr::new(*ip, port))
        .collect()
}

pub struct ProxyServer {
    listeners: Vec<TcpListener>,
    acceptor: TlsAcceptor,
    forwarder: Arc<LocalForwarder>,
}

impl ProxyServer {
    /// Bind every address up front so a busy port fails before anything is served
    pub async fn bind(
        addrs: &[SocketAddr],
        tls: Arc<ServerConfig>,
        forwarder: LocalForwarder,
    ) -> ProxyResult<Self> {
        if addrs.is_empty() {
            return Err(ProxyError::NoAddresses);
        }

        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| ProxyError::BindError {
                    address: addr.ip().to_string(),
                    port: addr.port(),
                    reason: e.to_string(),
                })?;
            info!("HTTPS proxy listening on {}", listener.local_addr()?);
            listeners.push(listener);
        }

        Ok(Self {
            listeners,
            acceptor: TlsAcceptor::from(tls),
            forwarder: Arc::new(forwarder),
        })
    }

    pub fn local_addrs(&self) -> ProxyResult<Vec<SocketAddr>> {
        self.listeners
            .iter()
            .map(|l| l.local_addr().map_err(ProxyError::from))
            .collect()
    }

    /// Serve until `cancel` fires. Open connections finish their current
    /// request and are then closed.
    pub async fn serve(self, cancel: CancellationToken) -> ProxyResult<()> {
        let mut loops = JoinSet::new();
        for listener in self.listeners {
            loops.spawn(accept_loop(
                listener,
                self.acceptor.clone(),
                self.forwarder.clone(),
                cancel.clone(),
            ));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!("Accept loop failed: {}", e);
            }
        }

        info!("HTTPS proxy stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    forwarder: Arc<LocalForwarder>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                let acceptor = acceptor.clone();
                let forwarder = forwarder.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, peer_addr, acceptor, forwarder, cancel).await
                    {
                        debug!("HTTPS connection error from {}: {}", peer_addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept HTTPS connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    forwarder: Arc<LocalForwarder>,
    cancel: CancellationToken,
) -> ProxyResult<()> {
    debug!("New HTTPS connection from {}", peer_addr);

    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            warn!("TLS handshake failed from {}: {}", peer_addr, e);
            return Err(ProxyError::TlsError(format!("Handshake failed: {}", e)));
        }
    };

    debug!("TLS handshake completed for {}", peer_addr);

    let service = service_fn(move |req| {
        let forwarder = forwarder.clone();
        async move { Ok::<_, Infallible>(forwarder.forward(req, peer_addr).await) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .keep_alive(true)
        .serve_connection(TokioIo::new(tls_stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = cancel.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    result.map_err(ProxyError::Connection)
}
