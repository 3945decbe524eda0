//! Namespaced request/response gateway over a pub/sub message bus.
//!
//! The gateway is generic over a [`Transport`]: the NATS backend lives in
//! `courier-gateway-nats` and an in-process backend in
//! `courier-gateway-memory`. Services describe their queue handlers with a
//! [`ServiceDesc`] and register them through [`Gateway::register_server`];
//! callers reach them with [`Gateway::call`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Connection configuration.
pub mod config;

/// Response envelope carried back to callers.
pub mod envelope;

/// Durable stream and consumer seams.
pub mod jetstream;

/// Service descriptors and queue handler registration.
pub mod service;

/// Subject naming.
pub mod subject;

/// Stream and consumer topology management.
pub mod topology;

/// Core message transport seam.
pub mod transport;

mod error;
mod gateway;
mod request;

pub use config::{GatewayConfig, TlsConfig};
pub use envelope::Envelope;
pub use error::{DecodeStage, Error, ResourceKind};
pub use gateway::Gateway;
pub use jetstream::JetStreamBackend;
pub use service::{HandlerError, Registration, ServiceDesc};
pub use subject::Namespacing;
pub use topology::{JetStream, PullSubscription};
pub use transport::{Message, Subscription, Transport, TransportError};
