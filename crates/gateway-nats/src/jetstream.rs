use std::fmt::Display;
use std::time::Duration;

use async_nats::jetstream::consumer::{self as nats_consumer, pull};
use async_nats::jetstream::ErrorCode;
use async_nats::jetstream::context::{
    CreateStreamError, CreateStreamErrorKind, DeleteStreamError, DeleteStreamErrorKind,
    GetStreamError, GetStreamErrorKind, PublishErrorKind,
};
use async_nats::jetstream::stream::{self as nats_stream, ConsumerError, ConsumerErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use courier_gateway::jetstream::{
    AckPolicy, Acker, ConsumerConfig, ConsumerInfo, Delivery, DeliveryStream, JetStreamBackend,
    PublishAck, RetentionPolicy, StreamConfig, StreamInfo,
};
use courier_gateway::{Message, ResourceKind, TransportError};
use futures::StreamExt;
use futures::future::BoxFuture;
use tracing::warn;

use crate::NatsTransport;

/// JetStream API errors that may carry a server error code.
trait ApiErrorCode {
    fn api_error_code(&self) -> Option<ErrorCode>;
}

impl ApiErrorCode for GetStreamError {
    fn api_error_code(&self) -> Option<ErrorCode> {
        match self.kind() {
            GetStreamErrorKind::JetStream(error) => Some(error.error_code()),
            _ => None,
        }
    }
}

impl ApiErrorCode for CreateStreamError {
    fn api_error_code(&self) -> Option<ErrorCode> {
        match self.kind() {
            CreateStreamErrorKind::JetStream(error) => Some(error.error_code()),
            _ => None,
        }
    }
}

impl ApiErrorCode for ConsumerError {
    fn api_error_code(&self) -> Option<ErrorCode> {
        match self.kind() {
            ConsumerErrorKind::JetStream(error) => Some(error.error_code()),
            _ => None,
        }
    }
}

const NOT_FOUND_CODES: [ErrorCode; 2] = [ErrorCode::STREAM_NOT_FOUND, ErrorCode::CONSUMER_NOT_FOUND];

const ALREADY_EXISTS_CODES: [ErrorCode; 3] = [
    ErrorCode::STREAM_NAME_EXIST,
    ErrorCode::CONSUMER_NAME_EXIST,
    ErrorCode::CONSUMER_ALREADY_EXISTS,
];

/// Maps a JetStream API error code onto the transport taxonomy.
fn classify(
    kind: ResourceKind,
    name: &str,
    code: Option<ErrorCode>,
    error: impl Display,
) -> TransportError {
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => TransportError::NotFound {
            kind,
            name: name.to_string(),
        },
        Some(code) if ALREADY_EXISTS_CODES.contains(&code) => TransportError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        _ => TransportError::JetStream(error.to_string()),
    }
}

fn api_error<E>(kind: ResourceKind, name: &str) -> impl FnOnce(E) -> TransportError + '_
where
    E: ApiErrorCode + Display,
{
    move |error| classify(kind, name, error.api_error_code(), error)
}

const fn to_nats_retention(retention: RetentionPolicy) -> nats_stream::RetentionPolicy {
    match retention {
        RetentionPolicy::Limits => nats_stream::RetentionPolicy::Limits,
        RetentionPolicy::Interest => nats_stream::RetentionPolicy::Interest,
        RetentionPolicy::WorkQueue => nats_stream::RetentionPolicy::WorkQueue,
    }
}

const fn from_nats_retention(retention: nats_stream::RetentionPolicy) -> RetentionPolicy {
    match retention {
        nats_stream::RetentionPolicy::Limits => RetentionPolicy::Limits,
        nats_stream::RetentionPolicy::Interest => RetentionPolicy::Interest,
        nats_stream::RetentionPolicy::WorkQueue => RetentionPolicy::WorkQueue,
    }
}

const fn to_nats_ack_policy(policy: AckPolicy) -> nats_consumer::AckPolicy {
    match policy {
        AckPolicy::Explicit => nats_consumer::AckPolicy::Explicit,
        AckPolicy::All => nats_consumer::AckPolicy::All,
        AckPolicy::None => nats_consumer::AckPolicy::None,
    }
}

const fn from_nats_ack_policy(policy: nats_consumer::AckPolicy) -> AckPolicy {
    match policy {
        nats_consumer::AckPolicy::Explicit => AckPolicy::Explicit,
        nats_consumer::AckPolicy::All => AckPolicy::All,
        nats_consumer::AckPolicy::None => AckPolicy::None,
    }
}

fn to_nats_stream_config(config: &StreamConfig) -> nats_stream::Config {
    apply_stream_config(nats_stream::Config::default(), config)
}

/// Overlays the modelled fields of `config` on `base`, keeping every server
/// setting the domain type does not carry, such as storage or replicas.
fn apply_stream_config(base: nats_stream::Config, config: &StreamConfig) -> nats_stream::Config {
    nats_stream::Config {
        name: config.name.clone(),
        subjects: config.subjects.clone(),
        retention: to_nats_retention(config.retention),
        max_consumers: config.max_consumers,
        max_messages: config.max_messages,
        max_message_size: config.max_message_size,
        no_ack: config.no_ack,
        ..base
    }
}

fn from_nats_stream_info(info: &nats_stream::Info) -> StreamInfo {
    StreamInfo {
        config: StreamConfig {
            name: info.config.name.clone(),
            subjects: info.config.subjects.clone(),
            retention: from_nats_retention(info.config.retention),
            max_consumers: info.config.max_consumers,
            max_messages: info.config.max_messages,
            max_message_size: info.config.max_message_size,
            no_ack: info.config.no_ack,
        },
        messages: info.state.messages,
        consumer_count: info.state.consumer_count,
    }
}

fn to_nats_consumer_config(config: &ConsumerConfig) -> pull::Config {
    pull::Config {
        durable_name: config.durable_name.clone(),
        name: config.durable_name.clone(),
        filter_subject: config.filter_subject.clone(),
        ack_policy: to_nats_ack_policy(config.ack_policy),
        ..Default::default()
    }
}

fn from_nats_consumer_info(info: &nats_consumer::Info) -> ConsumerInfo {
    ConsumerInfo {
        stream_name: info.stream_name.clone(),
        name: info.name.clone(),
        config: ConsumerConfig {
            durable_name: info.config.durable_name.clone(),
            filter_subject: info.config.filter_subject.clone(),
            ack_policy: from_nats_ack_policy(info.config.ack_policy),
        },
        num_pending: info.num_pending,
        num_ack_pending: info.num_ack_pending,
    }
}

struct NatsAcker(async_nats::jetstream::Message);

impl Acker for NatsAcker {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            self.0
                .ack()
                .await
                .map_err(|e| TransportError::JetStream(e.to_string()))
        })
    }
}

fn into_delivery(message: async_nats::jetstream::Message) -> Delivery {
    let delivered = Message {
        subject: message.message.subject.to_string(),
        reply: message.message.reply.as_ref().map(ToString::to_string),
        payload: message.message.payload.clone(),
    };

    Delivery::new(delivered, NatsAcker(message))
}

impl NatsTransport {
    async fn get_stream(&self, name: &str) -> Result<nats_stream::Stream, TransportError> {
        self.jetstream
            .get_stream(name)
            .await
            .map_err(api_error(ResourceKind::Stream, name))
    }
}

#[async_trait]
impl JetStreamBackend for NatsTransport {
    async fn stream_info(&self, name: &str) -> Result<Option<StreamInfo>, TransportError> {
        match self.get_stream(name).await {
            Ok(stream) => Ok(Some(from_nats_stream_info(stream.cached_info()))),
            Err(TransportError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        let stream = self
            .jetstream
            .create_stream(to_nats_stream_config(&config))
            .await
            .map_err(api_error(ResourceKind::Stream, &config.name))?;

        Ok(from_nats_stream_info(stream.cached_info()))
    }

    async fn update_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        let current = self.get_stream(&config.name).await?.cached_info().config.clone();

        let info = self
            .jetstream
            .update_stream(apply_stream_config(current, &config))
            .await
            .map_err(api_error(ResourceKind::Stream, &config.name))?;

        Ok(from_nats_stream_info(&info))
    }

    async fn delete_stream(&self, name: &str) -> Result<(), TransportError> {
        self.jetstream
            .delete_stream(name)
            .await
            .map(|_| ())
            .map_err(api_error(ResourceKind::Stream, name))
    }

    async fn consumer_info(
        &self,
        stream: &str,
        name: &str,
    ) -> Result<Option<ConsumerInfo>, TransportError> {
        let stream = match self.get_stream(stream).await {
            Ok(stream) => stream,
            Err(TransportError::NotFound { .. }) => return Ok(None),
            Err(error) => return Err(error),
        };

        match stream.get_consumer::<pull::Config>(name).await {
            Ok(consumer) => Ok(Some(from_nats_consumer_info(consumer.cached_info()))),
            Err(e) => match api_error(ResourceKind::Consumer, name)(e) {
                TransportError::NotFound { .. } => Ok(None),
                error => Err(error),
            },
        }
    }

    async fn create_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, TransportError> {
        let name = config.durable_name.clone().unwrap_or_default();
        let stream = self.get_stream(stream).await?;

        let consumer = stream
            .create_consumer(to_nats_consumer_config(&config))
            .await
            .map_err(api_error(ResourceKind::Consumer, &name))?;

        Ok(from_nats_consumer_info(consumer.cached_info()))
    }

    async fn publish_to_stream(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError> {
        let _permit = self
            .publish_permits
            .acquire()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        let ack = self
            .jetstream
            .publish(subject, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?
            .await
            .map_err(|e| match e.kind() {
                PublishErrorKind::StreamNotFound => TransportError::NoResponders,
                _ => TransportError::Publish(e.to_string()),
            })?;

        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }

    async fn consume(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<DeliveryStream, TransportError> {
        let name = config.durable_name.clone().unwrap_or_default();
        let stream = self.get_stream(stream).await?;
        let nats_config = to_nats_consumer_config(&config);

        let consumer = match &config.durable_name {
            Some(durable_name) => stream.get_or_create_consumer(durable_name, nats_config).await,
            None => stream.create_consumer(nats_config).await,
        }
        .map_err(api_error(ResourceKind::Consumer, &name))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        Ok(messages
            .filter_map(|message| async move {
                match message {
                    Ok(message) => Some(into_delivery(message)),
                    Err(e) => {
                        warn!("dropping failed JetStream delivery: {e}");
                        None
                    }
                }
            })
            .boxed())
    }

    async fn fetch(
        &self,
        stream: &str,
        consumer: &str,
        batch: usize,
        expires: Duration,
    ) -> Result<Vec<Delivery>, TransportError> {
        let stream = self.get_stream(stream).await?;
        let consumer_handle = stream
            .get_consumer::<pull::Config>(consumer)
            .await
            .map_err(api_error(ResourceKind::Consumer, consumer))?;

        let mut messages = Box::pin(
            consumer_handle
                .batch()
                .max_messages(batch)
                .expires(expires)
                .messages()
                .await
                .map_err(|e| TransportError::JetStream(e.to_string()))?,
        );

        let mut deliveries = Vec::new();
        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| TransportError::JetStream(e.to_string()))?;
            deliveries.push(into_delivery(message));
        }

        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_classify_by_error_code() {
        assert_matches!(
            classify(ResourceKind::Stream, "ORDERS", Some(ErrorCode::STREAM_NOT_FOUND), "stream not found"),
            TransportError::NotFound { kind: ResourceKind::Stream, name } if name == "ORDERS"
        );
        assert_matches!(
            classify(ResourceKind::Consumer, "billing", Some(ErrorCode::CONSUMER_NOT_FOUND), "consumer not found"),
            TransportError::NotFound { kind: ResourceKind::Consumer, .. }
        );
        assert_matches!(
            classify(ResourceKind::Stream, "ORDERS", Some(ErrorCode::STREAM_NAME_EXIST), "stream name already in use"),
            TransportError::AlreadyExists { kind: ResourceKind::Stream, .. }
        );
        assert_matches!(
            classify(ResourceKind::Consumer, "billing", Some(ErrorCode::CONSUMER_ALREADY_EXISTS), "consumer already exists"),
            TransportError::AlreadyExists { kind: ResourceKind::Consumer, .. }
        );
        assert_matches!(
            classify(ResourceKind::Consumer, "billing", Some(ErrorCode::CONSUMER_NAME_EXIST), "consumer name already in use"),
            TransportError::AlreadyExists { kind: ResourceKind::Consumer, .. }
        );
    }

    #[test]
    fn test_classify_ignores_message_text() {
        assert_matches!(
            classify(ResourceKind::Stream, "ORDERS", None, "subject not found in mapping"),
            TransportError::JetStream(message) if message == "subject not found in mapping"
        );
        assert_matches!(
            classify(ResourceKind::Consumer, "billing", None, "consumer already exists"),
            TransportError::JetStream(_)
        );
    }

    #[test]
    fn test_update_keeps_unmodelled_settings() {
        let current = nats_stream::Config {
            name: "ORDERS".to_string(),
            subjects: vec!["ORDERS.created".to_string()],
            max_age: Duration::from_secs(3600),
            num_replicas: 3,
            storage: nats_stream::StorageType::Memory,
            discard: nats_stream::DiscardPolicy::New,
            ..Default::default()
        };
        let mut config = StreamConfig::work_queue(
            "ORDERS".to_string(),
            vec!["ORDERS.created".to_string()],
        );
        config.subjects.push("ORDERS.cancelled".to_string());

        let updated = apply_stream_config(current, &config);

        assert_eq!(updated.subjects, vec!["ORDERS.created", "ORDERS.cancelled"]);
        assert_eq!(updated.max_age, Duration::from_secs(3600));
        assert_eq!(updated.num_replicas, 3);
        assert_eq!(updated.storage, nats_stream::StorageType::Memory);
        assert_eq!(updated.discard, nats_stream::DiscardPolicy::New);
    }

    #[test]
    fn test_stream_config_carries_work_queue_defaults() {
        let config = StreamConfig::work_queue(
            "ORDERS".to_string(),
            vec!["ORDERS.created".to_string()],
        );

        let nats = to_nats_stream_config(&config);

        assert_eq!(nats.name, "ORDERS");
        assert_eq!(nats.subjects, vec!["ORDERS.created"]);
        assert_eq!(nats.retention, nats_stream::RetentionPolicy::WorkQueue);
        assert_eq!(nats.max_consumers, -1);
        assert_eq!(nats.max_messages, -1);
        assert_eq!(nats.max_message_size, -1);
        assert!(!nats.no_ack);
    }

    #[test]
    fn test_consumer_config_is_durable_and_explicit() {
        let config = ConsumerConfig::durable("billing".to_string(), "ORDERS.created".to_string());

        let nats = to_nats_consumer_config(&config);

        assert_eq!(nats.durable_name.as_deref(), Some("billing"));
        assert_eq!(nats.filter_subject, "ORDERS.created");
        assert_eq!(nats.ack_policy, nats_consumer::AckPolicy::Explicit);
    }
}
