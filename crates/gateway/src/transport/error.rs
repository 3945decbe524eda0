use thiserror::Error;

use crate::ResourceKind;

/// Errors reported by a transport backend.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// Nothing was subscribed to the request subject.
    #[error("no responders")]
    NoResponders,

    /// The request timed out waiting for a reply.
    #[error("request timed out")]
    TimedOut,

    /// The referenced stream or consumer does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,

        /// Resource name.
        name: String,
    },

    /// A stream or consumer with that name exists with another configuration.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: ResourceKind,

        /// Resource name.
        name: String,
    },

    /// Publishing failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Subscribing failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The request failed for a reason other than timeout or no responders.
    #[error("request failed: {0}")]
    Request(String),

    /// A durable stream operation failed.
    #[error("jetstream error: {0}")]
    JetStream(String),
}
