//! NATS implementation of the gateway transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connect;
mod jetstream;

pub use connect::connect;

use std::sync::Arc;
use std::time::Duration;

use async_nats::Client;
use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use courier_gateway::config::PUBLISH_ASYNC_MAX_PENDING;
use courier_gateway::{Message, Subscription, Transport, TransportError};
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Gateway transport backed by a NATS client and its JetStream context.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    client: Client,
    jetstream: async_nats::jetstream::Context,
    publish_permits: Arc<Semaphore>,
}

impl NatsTransport {
    /// Wraps a connected client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        let jetstream = async_nats::jetstream::new(client.clone());

        Self {
            client,
            jetstream,
            publish_permits: Arc::new(Semaphore::new(PUBLISH_ASYNC_MAX_PENDING)),
        }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

fn into_message(message: async_nats::Message) -> Message {
    Message {
        subject: message.subject.to_string(),
        reply: message.reply.map(|reply| reply.to_string()),
        payload: message.payload,
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(subject, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.client
            .publish_with_reply(subject, reply, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        match tokio::time::timeout(timeout, self.client.request(subject, payload)).await {
            Ok(Ok(message)) => Ok(into_message(message)),
            Ok(Err(e)) => Err(match e.kind() {
                RequestErrorKind::NoResponders => TransportError::NoResponders,
                RequestErrorKind::TimedOut => TransportError::TimedOut,
                _ => TransportError::Request(e.to_string()),
            }),
            Err(_) => Err(TransportError::TimedOut),
        }
    }

    async fn subscribe(&self, subject: String) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        Ok(subscriber.map(into_message).boxed())
    }

    async fn queue_subscribe(
        &self,
        subject: String,
        queue_group: String,
    ) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .queue_subscribe(subject, queue_group)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        Ok(subscriber.map(into_message).boxed())
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use courier_gateway::service::{HandlerFuture, handle_typed};
    use courier_gateway::{Error, GatewayConfig, HandlerError, ServiceDesc};
    use serde::{Deserialize, Serialize};
    use serial_test::serial;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Ping {
        seq: u32,
    }

    struct Pong;

    fn pong(_: Arc<Pong>, payload: Bytes) -> HandlerFuture {
        handle_typed(payload, |ping: Ping| async move { Ok::<_, HandlerError>(ping) })
    }

    fn nats_url() -> String {
        std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running NATS server"]
    async fn test_call_round_trip() {
        let config = GatewayConfig::new(nats_url()).with_request_timeout(Duration::from_secs(2));
        let gateway = connect(config).await.unwrap();

        let desc = ServiceDesc::new("pong").queue("courier.test.ping", "pong", pong);
        let registration = gateway
            .register_server(desc, Arc::new(Pong))
            .await
            .unwrap();

        let reply: Ping = gateway
            .call("courier.test.ping", &Ping { seq: 3 })
            .await
            .unwrap();
        assert_eq!(reply, Ping { seq: 3 });

        registration.shutdown().await;
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running NATS server"]
    async fn test_call_without_responders() {
        let config = GatewayConfig::new(nats_url()).with_request_timeout(Duration::from_secs(2));
        let gateway = connect(config).await.unwrap();

        let result = gateway
            .call::<_, Ping>("courier.test.nobody", &Ping { seq: 1 })
            .await;

        assert!(result.as_ref().is_err_and(Error::is_unanswered));
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires a running NATS server"]
    async fn test_topology() {
        let gateway = connect(GatewayConfig::new(nats_url())).await.unwrap();
        let js = gateway.jetstream();
        let _ = js.delete_stream("COURIER_TEST").await;

        js.ensure_stream("COURIER_TEST", &["created"]).await.unwrap();
        js.ensure_stream("COURIER_TEST", &["created"]).await.unwrap();

        let info = js
            .extend_stream_subjects("COURIER_TEST", &["created", "cancelled"])
            .await
            .unwrap();
        assert_eq!(
            info.config.subjects,
            vec!["COURIER_TEST.created", "COURIER_TEST.cancelled"]
        );

        js.ensure_consumer("COURIER_TEST", "created", "billing")
            .await
            .unwrap();
        js.ensure_consumer("COURIER_TEST", "created", "billing")
            .await
            .unwrap();

        js.publish("COURIER_TEST", "created", Bytes::from_static(b"1"))
            .await
            .unwrap();

        let subscription = js
            .pull_subscribe("COURIER_TEST", "created", "billing")
            .await
            .unwrap();
        let deliveries = subscription
            .fetch(1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        for delivery in deliveries {
            delivery.ack().await.unwrap();
        }

        js.delete_stream("COURIER_TEST").await.unwrap();
    }
}
