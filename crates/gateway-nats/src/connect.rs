use async_nats::{ConnectOptions, Event};
use courier_gateway::config::RECONNECT_WAIT;
use courier_gateway::{Error, Gateway, GatewayConfig};
use tracing::{debug, info, instrument, warn};

use crate::NatsTransport;

fn log_event(event: Event) {
    match event {
        Event::Connected => info!("NATS connected"),
        Event::Disconnected => warn!("NATS disconnected, reconnecting"),
        Event::ServerError(error) => warn!(%error, "NATS server error"),
        Event::ClientError(error) => warn!(%error, "NATS client error"),
        Event::SlowConsumer(sid) => warn!(sid, "NATS slow consumer"),
        Event::LameDuckMode => warn!("NATS server entering lame duck mode"),
        Event::Closed => info!("NATS connection closed"),
        other => debug!(event = %other, "NATS event"),
    }
}

fn connect_options(config: &GatewayConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new()
        .max_reconnects(None)
        .reconnect_delay_callback(|attempts| {
            debug!(attempts, "NATS reconnect attempt");
            RECONNECT_WAIT
        })
        .request_timeout(Some(config.effective_request_timeout()))
        .event_callback(|event| async move { log_event(event) });

    if let Some(user) = &config.user {
        let password = config.password.clone().unwrap_or_default();
        options = options.user_and_password(user.clone(), password);
    }

    if let Some(tls) = &config.tls {
        options = options
            .require_tls(true)
            .add_client_certificate(tls.cert_file.clone(), tls.key_file.clone())
            .add_root_certificates(tls.root_ca_file.clone());
    }

    options
}

/// Connects to the NATS server in `config` and wraps the connection in a
/// gateway.
///
/// Once connected the client reconnects forever, waiting
/// [`RECONNECT_WAIT`] between attempts.
///
/// # Errors
///
/// Returns [`Error::Config`] for an invalid config and
/// [`Error::Connection`] if the initial connection fails.
#[instrument(skip(config), fields(url = %config.url))]
pub async fn connect(config: GatewayConfig) -> Result<Gateway<NatsTransport>, Error> {
    config.validate()?;

    let client = connect_options(&config)
        .connect(config.url.as_str())
        .await
        .map_err(|e| Error::Connection {
            url: config.url.clone(),
            source: Box::new(e),
        })?;

    info!(authenticated = config.user.is_some(), tls = config.tls.is_some(), "connected");

    Gateway::new(NatsTransport::new(client), config)
}
