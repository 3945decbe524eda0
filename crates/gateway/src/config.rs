use std::path::PathBuf;
use std::time::Duration;

use crate::Error;

/// Request timeout used when none (or zero) is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed delay between reconnection attempts.
pub const RECONNECT_WAIT: Duration = Duration::from_secs(2);

/// Upper bound on outstanding asynchronous stream publishes.
pub const PUBLISH_ASYNC_MAX_PENDING: usize = 256;

/// TLS material for mutual authentication with the bus.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlsConfig {
    /// Client certificate (PEM).
    pub cert_file: PathBuf,

    /// Client private key (PEM).
    pub key_file: PathBuf,

    /// Root CA used to verify the server (PEM).
    pub root_ca_file: PathBuf,
}

/// Everything needed to open a gateway connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GatewayConfig {
    /// Bus endpoint. Required.
    pub url: String,

    /// Username. Credentials are only sent when this is set.
    pub user: Option<String>,

    /// Password for `user`.
    pub password: Option<String>,

    /// Optional TLS material.
    pub tls: Option<TlsConfig>,

    /// Request timeout. Falls back to [`DEFAULT_REQUEST_TIMEOUT`].
    pub request_timeout: Option<Duration>,

    /// Initial namespace applied to namespaced subjects.
    pub namespace: Option<String>,

    /// Log request/response traffic with correlation ids.
    pub debug: bool,
}

impl GatewayConfig {
    /// Creates a config for `url` with everything else defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the username and password.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the TLS material.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the initial namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Enables or disables traffic logging.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Checks the parameters needed before dialing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is empty, or
    /// [`Error::EmptyNamespace`] if an initial namespace is set but empty.
    pub fn validate(&self) -> Result<(), Error> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("connect URL is required".to_string()));
        }

        if self.namespace.as_deref().is_some_and(str::is_empty) {
            return Err(Error::EmptyNamespace);
        }

        Ok(())
    }

    /// The timeout applied to every request.
    #[must_use]
    pub fn effective_request_timeout(&self) -> Duration {
        self.request_timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}
