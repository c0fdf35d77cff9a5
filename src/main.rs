//! tsrouter - expose a local service on a tailnet
//!
//! Provisions an ephemeral, pre-authorized auth key with OAuth client
//! credentials, joins the tailnet under `--hostname` and serves HTTPS on the
//! node's addresses, forwarding every request to `localhost:<target-port>`.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tsrouter_auth::{AuthenticatedClient, OAuthConfig};
use tsrouter_mesh::{
    default_state_root, JoinRequest, MeshError, MeshNode, MeshSession, TailscaleCli,
};
use tsrouter_provision::{KeyPolicy, KeyProvisioner, DEFAULT_TAG, TAILSCALE_API_BASE};
use tsrouter_proxy::{listen_addrs, server_config, LocalForwarder, ProxyServer};

use crate::config::Credentials;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Expose a local service on your tailnet through an ephemeral node
#[derive(Parser, Debug)]
#[command(name = "tsrouter")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Local port to forward traffic to
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    target_port: u16,

    /// Hostname of the node on the tailnet
    #[arg(long)]
    hostname: String,

    /// Log level (RUST_LOG overrides)
    #[arg(long, default_value = "error", value_parser = ["error", "info", "debug"])]
    log_level: String,

    /// ACL tag for the node (repeatable)
    #[arg(long = "tag", value_name = "TAG", default_value = DEFAULT_TAG)]
    tags: Vec<String>,

    /// Lifetime of the auth key in days
    #[arg(long, default_value = "14", value_parser = clap::value_parser!(u64).range(1..=90))]
    key_expiry_days: u64,

    /// Port to serve HTTPS on
    #[arg(long, default_value = "443", value_parser = clap::value_parser!(u16).range(1..))]
    listen_port: u16,

    /// OAuth client ID
    #[arg(long, env = "TS_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "TS_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Tailnet to provision the key in
    #[arg(long, env = "TS_TAILNET")]
    tailnet: Option<String>,

    /// Path to the tailscale CLI
    #[arg(long, default_value = "tailscale")]
    tailscale_bin: PathBuf,

    /// tailscaled socket to talk to instead of the system default
    #[arg(long)]
    tailscale_socket: Option<PathBuf>,

    #[arg(long, default_value = TAILSCALE_API_BASE, hide = true)]
    api_base: String,
}

impl Cli {
    fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::new(
            self.tags.clone(),
            Duration::from_secs(self.key_expiry_days * SECONDS_PER_DAY),
        )
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_base.trim_end_matches('/'))
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_files = config::load_env_files();

    // Install the ring provider before anything builds a TLS config
    let _ = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::ring::default_provider(),
    );

    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    for file in &env_files {
        file.log();
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            shutdown.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let credentials = Credentials::from_values(
        cli.client_id.clone(),
        cli.client_secret.clone(),
        cli.tailnet.clone(),
    )?;
    credentials.log();

    let oauth = OAuthConfig::new(credentials.client_id.clone(), credentials.client_secret.clone())
        .with_token_url(cli.token_url());
    let client = AuthenticatedClient::new(oauth).context("Failed to create API client")?;

    let provisioner = KeyProvisioner::new(client)
        .with_api_base(cli.api_base.clone())
        .with_policy(cli.key_policy());
    provisioner
        .authenticate(&cancel)
        .await
        .context("Failed to test OAuth token")?;
    let record = provisioner
        .provision(&credentials.tailnet, &cancel)
        .await
        .context("Failed to generate auth key")?;

    let mut mesh = TailscaleCli::new(default_state_root()?).with_binary(cli.tailscale_bin.clone());
    if let Some(socket) = &cli.tailscale_socket {
        mesh = mesh.with_socket(socket.clone());
    }

    debug!("Starting Tailscale node...");
    let joined = cancel
        .run_until_cancelled(mesh.join(JoinRequest::new(cli.hostname.clone(), record.key)))
        .await
        .unwrap_or(Err(MeshError::Cancelled))
        .context("Failed to start Tailscale node");

    let served = match joined {
        Ok(session) => serve(&cli, &credentials, &session, cancel).await,
        Err(e) => Err(e),
    };

    // A join that failed after `up` still leaves a node behind
    if let Err(e) = mesh.leave().await {
        warn!("Failed to leave tailnet: {}", e);
    }

    served
}

async fn serve(
    cli: &Cli,
    credentials: &Credentials,
    session: &MeshSession,
    cancel: CancellationToken,
) -> Result<()> {
    let tls = server_config(&session.cert_path, &session.key_path)
        .context("Failed to load node certificate")?;
    let addrs = listen_addrs(&session.addresses, cli.listen_port);

    let server = ProxyServer::bind(&addrs, tls, LocalForwarder::new(cli.target_port))
        .await
        .context("Failed to create Tailscale listener")?;

    info!(
        hostname = %session.hostname,
        tailnet = session.tailnet.as_deref().unwrap_or(credentials.tailnet.as_str()),
        instance_dir = %session.instance_dir.display(),
        "Service available at {} -> localhost:{}",
        session.dns_name,
        cli.target_port
    );

    server.serve(cancel).await.context("Failed to serve proxy")
}
