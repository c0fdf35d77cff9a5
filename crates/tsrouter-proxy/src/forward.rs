//! Forwarding to the local service
//!
//! Requests are replayed over pooled HTTP/1.1 connections to
//! `127.0.0.1:<port>`. Bodies stream through in both directions.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::Uri;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ProxyError, ProxyResult};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Maximum number of idle connections kept to the local service
const MAX_POOL_SIZE: usize = 10;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

type Pool = Arc<Mutex<Vec<http1::SendRequest<Incoming>>>>;

/// Reverse proxy to a single local port
pub struct LocalForwarder {
    target: SocketAddr,
    pool: Pool,
}

impl LocalForwarder {
    pub fn new(target_port: u16) -> Self {
        Self::with_target(SocketAddr::from(([127, 0, 0, 1], target_port)))
    }

    pub fn with_target(target: SocketAddr) -> Self {
        Self {
            target,
            pool: Arc::new(Mutex::new(Vec::with_capacity(MAX_POOL_SIZE))),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Forward `req`, answering 502 when the local service cannot be reached
    pub async fn forward(&self, req: Request<Incoming>, client: SocketAddr) -> Response<ProxyBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.try_forward(req, client).await {
            Ok(response) => {
                debug!(%method, %path, status = response.status().as_u16(), "Forwarded request");
                response
            }
            Err(e) => {
                warn!(%method, %path, target = %self.target, "Proxy error: {}", e);
                bad_gateway(&e)
            }
        }
    }

    async fn try_forward(
        &self,
        req: Request<Incoming>,
        client: SocketAddr,
    ) -> ProxyResult<Response<ProxyBody>> {
        let req = prepare_request(req, client)?;

        let mut sender = self.get_connection().await?;
        let response = sender
            .send_request(req)
            .await
            .map_err(ProxyError::Upstream)?;
        self.return_connection(sender);

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, body.boxed()))
    }

    /// Get or create a connection to the target
    async fn get_connection(&self) -> ProxyResult<http1::SendRequest<Incoming>> {
        {
            let mut pool = self.pool.lock().await;
            while let Some(sender) = pool.pop() {
                if sender.is_ready() {
                    debug!("Reusing pooled connection to {}", self.target);
                    return Ok(sender);
                }
                debug!("Discarding stale connection from pool");
            }
        }

        debug!("Creating new connection to {}", self.target);
        let stream = TcpStream::connect(self.target).await.map_err(|e| {
            ProxyError::ConnectionFailed(format!("Failed to connect to {}: {}", self.target, e))
        })?;
        stream.set_nodelay(true)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("HTTP handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection closed: {}", e);
            }
        });

        Ok(sender)
    }

    /// Pool the connection once the in-flight response has been consumed
    fn return_connection(&self, mut sender: http1::SendRequest<Incoming>) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if sender.ready().await.is_err() {
                debug!("Not returning closed connection to pool");
                return;
            }
            let mut pool = pool.lock().await;
            if pool.len() < MAX_POOL_SIZE {
                pool.push(sender);
                debug!("Returned connection to pool (size: {})", pool.len());
            }
        });
    }
}

/// Rewrite an inbound request for the local service
fn prepare_request(req: Request<Incoming>, client: SocketAddr) -> ProxyResult<Request<Incoming>> {
    let (mut parts, body) = req.into_parts();

    let original_host = parts
        .headers
        .get(header::HOST)
        .cloned()
        .or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

    // Origin-form only; the local service sees the path it would get directly
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = path_and_query
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidRequest(format!("Bad request target: {}", e)))?;

    strip_hop_by_hop(&mut parts.headers);

    let client_ip = client.ip().to_string();
    let forwarded_for = match parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) => format!("{}, {}", prior, client_ip),
        None => client_ip,
    };
    let forwarded_for = HeaderValue::from_str(&forwarded_for)
        .map_err(|e| ProxyError::InvalidRequest(format!("Bad X-Forwarded-For: {}", e)))?;

    parts.headers.insert(X_FORWARDED_FOR, forwarded_for);
    parts
        .headers
        .insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
    if let Some(host) = original_host {
        if !parts.headers.contains_key(header::HOST) {
            parts.headers.insert(header::HOST, host.clone());
        }
        parts.headers.insert(X_FORWARDED_HOST, host);
    }

    Ok(Request::from_parts(parts, body))
}

/// Remove hop-by-hop headers, including any named in `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn bad_gateway(err: &ProxyError) -> Response<ProxyBody> {
    let mut response = Response::new(full(format!("Bad Gateway: {}\n", err)));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn full(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}
