use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::subject::{Namespacing, apply_namespace};
use crate::transport::Transport;
use crate::{Error, GatewayConfig};

/// Shared handle to one bus connection and its active namespace.
///
/// Clones share the connection and the namespace: a namespace change made
/// through any clone is seen by all of them.
#[derive(Clone, Debug)]
pub struct Gateway<T>
where
    T: Transport,
{
    pub(crate) transport: T,
    pub(crate) config: Arc<GatewayConfig>,
    namespace: Arc<ArcSwapOption<String>>,
}

impl<T> Gateway<T>
where
    T: Transport,
{
    /// Wraps an established transport.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(transport: T, config: GatewayConfig) -> Result<Self, Error> {
        config.validate()?;

        let namespace = ArcSwapOption::from(config.namespace.clone().map(Arc::new));

        Ok(Self {
            transport,
            config: Arc::new(config),
            namespace: Arc::new(namespace),
        })
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The configuration the gateway was created with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Timeout applied to every request.
    pub fn request_timeout(&self) -> Duration {
        self.config.effective_request_timeout()
    }

    /// The active namespace, if any.
    pub fn namespace(&self) -> Option<Arc<String>> {
        self.namespace.load_full()
    }

    /// Replaces the active namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyNamespace`] if `namespace` is empty.
    pub fn set_namespace(&self, namespace: impl Into<String>) -> Result<(), Error> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(Error::EmptyNamespace);
        }

        info!(%namespace, "namespace set");
        self.namespace.store(Some(Arc::new(namespace)));

        Ok(())
    }

    /// Fully-qualified subject for `subject` under `namespacing`.
    pub fn resolve_subject(&self, subject: &str, namespacing: &Namespacing) -> String {
        match namespacing {
            Namespacing::Active => {
                let namespace = self.namespace.load();
                apply_namespace(subject, namespace.as_deref().map(String::as_str))
            }
            Namespacing::Override(namespace) => apply_namespace(subject, Some(namespace)),
            Namespacing::Bare => subject.to_string(),
        }
    }
}
