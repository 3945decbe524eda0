//! Worker binary serving the staff permission queue over NATS.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use courier_gateway::{GatewayConfig, TlsConfig};
use courier_staff::{AllowListStaffServer, register_server};
use tracing::info;

/// Worker error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Gateway error
    #[error(transparent)]
    Gateway(#[from] courier_gateway::Error),

    /// Signal handler registration failed
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),

    /// Incomplete TLS flags
    #[error("tls config error: {0}")]
    Tls(&'static str),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// NATS server URL
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "NATS_URL")]
    url: String,

    /// Username for the NATS connection
    #[arg(long, env = "COURIER_USER")]
    user: Option<String>,

    /// Password for the NATS connection
    #[arg(long, env = "COURIER_PASSWORD")]
    password: Option<String>,

    /// Client certificate (PEM)
    #[arg(long, env = "COURIER_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, env = "COURIER_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Root CA (PEM)
    #[arg(long, env = "COURIER_TLS_CA")]
    tls_ca: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10, env = "COURIER_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Namespace prefixed to namespaced subjects
    #[arg(long, env = "COURIER_NAMESPACE")]
    namespace: Option<String>,

    /// Log request and reply traffic
    #[arg(long, default_value_t = false, env = "COURIER_DEBUG")]
    debug: bool,

    /// Users allowed by the permission check (repeatable)
    #[arg(long = "allow-user", env = "COURIER_ALLOW_USERS", value_delimiter = ',')]
    allow_users: Vec<String>,
}

impl Args {
    fn tls(&self) -> Result<Option<TlsConfig>, Error> {
        match (&self.tls_cert, &self.tls_key, &self.tls_ca) {
            (None, None, None) => Ok(None),
            (Some(cert_file), Some(key_file), Some(root_ca_file)) => Ok(Some(TlsConfig {
                cert_file: cert_file.clone(),
                key_file: key_file.clone(),
                root_ca_file: root_ca_file.clone(),
            })),
            _ => Err(Error::Tls(
                "--tls-cert, --tls-key and --tls-ca must be given together",
            )),
        }
    }

    fn gateway_config(&self) -> Result<GatewayConfig, Error> {
        let mut config = GatewayConfig::new(&self.url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_debug(self.debug);

        if let Some(user) = &self.user {
            config = config.with_credentials(user, self.password.clone().unwrap_or_default());
        }

        if let Some(tls) = self.tls()? {
            config = config.with_tls(tls);
        }

        if let Some(namespace) = &self.namespace {
            config = config.with_namespace(namespace);
        }

        Ok(config)
    }
}

async fn wait_for_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received interrupt signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.gateway_config()?;

    let gateway = courier_gateway_nats::connect(config).await?;
    let service = Arc::new(AllowListStaffServer::new(args.allow_users.clone()));
    let registration = register_server(&gateway, service).await?;

    info!(subjects = ?registration.subjects(), "staff worker ready");

    let result = wait_for_signal().await;

    info!("Shutting down");
    registration.shutdown().await;

    result
}
