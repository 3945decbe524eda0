mod config;

pub use config::{
    AckPolicy, ConsumerConfig, ConsumerInfo, PublishAck, RetentionPolicy, StreamConfig, StreamInfo,
};

use std::fmt::{self, Debug};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::transport::{Message, TransportError};

/// Acknowledges one delivery back to the bus.
pub trait Acker: Send + Sync + 'static {
    /// Acknowledges the delivery.
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>>;
}

/// A message delivered by a consumer that must be acknowledged.
pub struct Delivery {
    /// The delivered message.
    pub message: Message,

    acker: Box<dyn Acker>,
}

impl Delivery {
    /// Pairs a message with the handle that acknowledges it.
    pub fn new(message: Message, acker: impl Acker) -> Self {
        Self {
            message,
            acker: Box::new(acker),
        }
    }

    /// Acknowledges the delivery, consuming it.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the acknowledgment could not be sent.
    pub async fn ack(self) -> Result<(), TransportError> {
        self.acker.ack().await
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Push-style stream of deliveries.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Durable stream and consumer operations of the bus.
#[async_trait]
pub trait JetStreamBackend
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// Looks up a stream. `None` if it does not exist.
    async fn stream_info(&self, name: &str) -> Result<Option<StreamInfo>, TransportError>;

    /// Creates a stream. Creating an identical stream again succeeds.
    async fn create_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError>;

    /// Replaces the configuration of an existing stream.
    async fn update_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError>;

    /// Deletes a stream and everything in it.
    async fn delete_stream(&self, name: &str) -> Result<(), TransportError>;

    /// Looks up a consumer. `None` if it or its stream does not exist.
    async fn consumer_info(
        &self,
        stream: &str,
        name: &str,
    ) -> Result<Option<ConsumerInfo>, TransportError>;

    /// Creates a durable consumer on `stream`.
    async fn create_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, TransportError>;

    /// Publishes into whichever stream captures `subject`.
    async fn publish_to_stream(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError>;

    /// Starts pushing deliveries. A durable config binds to (or creates) the
    /// named consumer so several callers share its work.
    async fn consume(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<DeliveryStream, TransportError>;

    /// Pulls up to `batch` deliveries from an existing consumer, waiting at
    /// most `expires` for the first one.
    async fn fetch(
        &self,
        stream: &str,
        consumer: &str,
        batch: usize,
        expires: Duration,
    ) -> Result<Vec<Delivery>, TransportError>;
}
