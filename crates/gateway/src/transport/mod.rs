mod error;

pub use error::TransportError;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// A message as seen by subscribers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: String,

    /// Reply subject, when the publisher expects an answer.
    pub reply: Option<String>,

    /// Raw payload.
    pub payload: Bytes,
}

/// Live subscription. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, Message>;

/// Core publish/subscribe operations of the bus.
///
/// Implementations correlate request replies themselves: [`Transport::request`]
/// publishes with a fresh reply inbox and waits for the first message on it.
#[async_trait]
pub trait Transport
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// Publishes `payload` on `subject`.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), TransportError>;

    /// Publishes `payload` on `subject` with an explicit reply subject.
    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Sends a request and waits up to `timeout` for the reply.
    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    /// Subscribes to `subject`, which may contain `*` and `>` wildcards.
    async fn subscribe(&self, subject: String) -> Result<Subscription, TransportError>;

    /// Subscribes as a member of `queue_group`; each message goes to one member.
    async fn queue_subscribe(
        &self,
        subject: String,
        queue_group: String,
    ) -> Result<Subscription, TransportError>;

    /// A unique subject suitable for receiving replies.
    fn new_inbox(&self) -> String;
}
