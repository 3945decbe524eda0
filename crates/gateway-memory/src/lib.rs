//! In-process implementation of the gateway transport.
//!
//! Routes messages between subscriptions of one [`MemoryTransport`] (and its
//! clones) with NATS subject semantics: `*`/`>` wildcards, queue groups that
//! hand each message to one member, request/reply through unique inboxes and
//! work-queue streams with explicitly acknowledged consumers. Deliveries that
//! are never acknowledged are not redelivered.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod jetstream;
mod subject;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_gateway::{Gateway, GatewayConfig, Message, Subscription, Transport, TransportError};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::jetstream::Streams;
use crate::subject::subject_matches;

/// In-memory message bus. Clones share the same bus.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    router: Mutex<Router>,
    streams: Mutex<Streams>,
    stored: Notify,
}

impl MemoryTransport {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live core subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let mut router = self.inner.router.lock();
        router.prune();
        router.subscribers.len()
    }

    fn route(&self, message: &Message) -> usize {
        self.inner.router.lock().route(message)
    }

    fn subscribe_internal(&self, pattern: String, queue_group: Option<String>) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();

        self.inner.router.lock().subscribers.push(Subscriber {
            pattern,
            queue_group,
            sender,
        });

        UnboundedReceiverStream::new(receiver).boxed()
    }
}

/// Connects a gateway to a fresh in-memory bus.
///
/// # Errors
///
/// Returns an error if `config` does not validate.
pub fn connect(config: GatewayConfig) -> Result<Gateway<MemoryTransport>, courier_gateway::Error> {
    Gateway::new(MemoryTransport::new(), config)
}

#[derive(Debug)]
struct Subscriber {
    pattern: String,
    queue_group: Option<String>,
    sender: mpsc::UnboundedSender<Message>,
}

#[derive(Debug, Default)]
struct Router {
    subscribers: Vec<Subscriber>,
    cursors: HashMap<String, usize>,
}

impl Router {
    fn prune(&mut self) {
        self.subscribers.retain(|subscriber| !subscriber.sender.is_closed());
    }

    /// Delivers to every plain subscriber and to one member of each queue
    /// group. Returns how many subscriptions received the message.
    fn route(&mut self, message: &Message) -> usize {
        self.prune();

        let mut delivered = 0;
        let mut groups: BTreeMap<&str, Vec<&Subscriber>> = BTreeMap::new();

        for subscriber in self
            .subscribers
            .iter()
            .filter(|subscriber| subject_matches(&subscriber.pattern, &message.subject))
        {
            match &subscriber.queue_group {
                Some(group) => groups.entry(group.as_str()).or_default().push(subscriber),
                None => {
                    if subscriber.sender.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        for (group, members) in groups {
            let cursor = self.cursors.entry(group.to_string()).or_default();
            let member = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);

            if member.sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }

        delivered
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), TransportError> {
        let message = Message {
            subject,
            reply: None,
            payload,
        };

        let delivered = self.route(&message);
        trace!(subject = %message.subject, delivered, "published");

        if let Err(error) = self.capture(&message.subject, &message.payload) {
            debug!(subject = %message.subject, %error, "stream rejected message");
        }

        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let message = Message {
            subject,
            reply: Some(reply),
            payload,
        };

        let delivered = self.route(&message);
        trace!(subject = %message.subject, delivered, "published with reply");

        if let Err(error) = self.capture(&message.subject, &message.payload) {
            debug!(subject = %message.subject, %error, "stream rejected message");
        }

        Ok(())
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let inbox = self.new_inbox();
        let mut replies = self.subscribe_internal(inbox.clone(), None);

        let message = Message {
            subject,
            reply: Some(inbox),
            payload,
        };

        if self.route(&message) == 0 {
            return Err(TransportError::NoResponders);
        }

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(TransportError::NoResponders),
            Err(_) => Err(TransportError::TimedOut),
        }
    }

    async fn subscribe(&self, subject: String) -> Result<Subscription, TransportError> {
        Ok(self.subscribe_internal(subject, None))
    }

    async fn queue_subscribe(
        &self,
        subject: String,
        queue_group: String,
    ) -> Result<Subscription, TransportError> {
        Ok(self.subscribe_internal(subject, Some(queue_group)))
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_wildcard_subscription() {
        let transport = MemoryTransport::new();
        let mut subscription = transport.subscribe("ORDERS.*".to_string()).await.unwrap();

        transport
            .publish("ORDERS.created".to_string(), Bytes::from_static(b"1"))
            .await
            .unwrap();
        transport
            .publish("INVOICES.created".to_string(), Bytes::from_static(b"2"))
            .await
            .unwrap();
        transport
            .publish("ORDERS.cancelled".to_string(), Bytes::from_static(b"3"))
            .await
            .unwrap();

        let first = subscription.next().await.unwrap();
        let second = subscription.next().await.unwrap();

        assert_eq!(first.subject, "ORDERS.created");
        assert_eq!(second.payload, Bytes::from_static(b"3"));
    }

    #[tokio::test]
    async fn test_queue_group_delivers_to_one_member() {
        let transport = MemoryTransport::new();
        let a = transport
            .queue_subscribe("jobs".to_string(), "workers".to_string())
            .await
            .unwrap();
        let b = transport
            .queue_subscribe("jobs".to_string(), "workers".to_string())
            .await
            .unwrap();

        for i in 0..4u8 {
            transport
                .publish("jobs".to_string(), Bytes::from(vec![i]))
                .await
                .unwrap();
        }
        drop(transport);

        let from_a = a.count().await;
        let from_b = b.count().await;

        assert_eq!(from_a, 2);
        assert_eq!(from_b, 2);
    }

    #[tokio::test]
    async fn test_request_without_subscribers() {
        let transport = MemoryTransport::new();

        let result = transport
            .request(
                "nobody.home".to_string(),
                Bytes::new(),
                Duration::from_secs(5),
            )
            .await;

        assert_matches!(result, Err(TransportError::NoResponders));
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let transport = MemoryTransport::new();
        let _silent = transport.subscribe("silent".to_string()).await.unwrap();

        let result = transport
            .request("silent".to_string(), Bytes::new(), Duration::from_millis(50))
            .await;

        assert_matches!(result, Err(TransportError::TimedOut));
    }

    #[tokio::test]
    async fn test_dropped_subscriptions_are_pruned() {
        let transport = MemoryTransport::new();
        let subscription = transport.subscribe("a".to_string()).await.unwrap();
        assert_eq!(transport.subscription_count(), 1);

        drop(subscription);
        assert_eq!(transport.subscription_count(), 0);
    }
}
