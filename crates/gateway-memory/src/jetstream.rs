use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_gateway::jetstream::{
    AckPolicy, Acker, ConsumerConfig, ConsumerInfo, Delivery, DeliveryStream, JetStreamBackend,
    PublishAck, RetentionPolicy, StreamConfig, StreamInfo,
};
use courier_gateway::{Message, ResourceKind, TransportError};
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::MemoryTransport;
use crate::subject::{subject_matches, subjects_overlap};

#[derive(Debug, Default)]
pub struct Streams {
    streams: BTreeMap<String, StreamState>,
}

#[derive(Debug)]
struct StreamState {
    config: StreamConfig,
    messages: BTreeMap<u64, StoredMessage>,
    last_sequence: u64,
    consumers: BTreeMap<String, ConsumerState>,
}

#[derive(Clone, Debug)]
struct StoredMessage {
    subject: String,
    payload: Bytes,
}

#[derive(Debug)]
struct ConsumerState {
    config: ConsumerConfig,
    ephemeral: bool,
    delivered_through: u64,
    ack_pending: BTreeSet<u64>,
    push: Vec<mpsc::UnboundedSender<Delivery>>,
    cursor: usize,
}

impl ConsumerState {
    fn new(config: ConsumerConfig, ephemeral: bool) -> Self {
        Self {
            config,
            ephemeral,
            delivered_through: 0,
            ack_pending: BTreeSet::new(),
            push: Vec::new(),
            cursor: 0,
        }
    }

    fn wants(&self, subject: &str) -> bool {
        self.config.filter_subject.is_empty()
            || subject_matches(&self.config.filter_subject, subject)
    }
}

fn not_found(kind: ResourceKind, name: &str) -> TransportError {
    TransportError::NotFound {
        kind,
        name: name.to_string(),
    }
}

impl StreamState {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            config: self.config.clone(),
            messages: self.messages.len() as u64,
            consumer_count: self.consumers.len(),
        }
    }

    fn consumer_info(&self, name: &str) -> Option<ConsumerInfo> {
        let consumer = self.consumers.get(name)?;

        let num_pending = self
            .messages
            .range(consumer.delivered_through + 1..)
            .filter(|(_, message)| consumer.wants(&message.subject))
            .count() as u64;

        Some(ConsumerInfo {
            stream_name: self.config.name.clone(),
            name: name.to_string(),
            config: consumer.config.clone(),
            num_pending,
            num_ack_pending: consumer.ack_pending.len(),
        })
    }

    /// Hands out up to `limit` undelivered messages of one consumer.
    fn take_pending(
        &mut self,
        transport: &MemoryTransport,
        consumer_name: &str,
        limit: usize,
    ) -> Vec<Delivery> {
        let Some(consumer) = self.consumers.get_mut(consumer_name) else {
            return Vec::new();
        };

        let sequences: Vec<u64> = self
            .messages
            .range(consumer.delivered_through + 1..)
            .filter(|(_, message)| consumer.wants(&message.subject))
            .take(limit)
            .map(|(sequence, _)| *sequence)
            .collect();

        let mut deliveries = Vec::with_capacity(sequences.len());

        for sequence in sequences {
            let Some(stored) = self.messages.get(&sequence).cloned() else {
                continue;
            };

            consumer.delivered_through = sequence;

            match consumer.config.ack_policy {
                AckPolicy::None => {
                    if self.config.retention == RetentionPolicy::WorkQueue {
                        self.messages.remove(&sequence);
                    }
                }
                AckPolicy::Explicit | AckPolicy::All => {
                    consumer.ack_pending.insert(sequence);
                }
            }

            deliveries.push(Delivery::new(
                Message {
                    subject: stored.subject,
                    reply: None,
                    payload: stored.payload,
                },
                MemoryAcker {
                    transport: transport.clone(),
                    stream: self.config.name.clone(),
                    consumer: consumer_name.to_string(),
                    sequence,
                },
            ));
        }

        deliveries
    }

    /// Pushes pending messages to consumers that have live push receivers.
    fn dispatch(&mut self, transport: &MemoryTransport) {
        self.consumers.retain(|_, consumer| {
            let had_receivers = !consumer.push.is_empty();
            consumer.push.retain(|sender| !sender.is_closed());
            !(consumer.ephemeral && had_receivers && consumer.push.is_empty())
        });

        let names: Vec<String> = self
            .consumers
            .iter()
            .filter(|(_, consumer)| !consumer.push.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        for name in names {
            for delivery in self.take_pending(transport, &name, usize::MAX) {
                let Some(consumer) = self.consumers.get_mut(&name) else {
                    break;
                };

                let index = consumer.cursor % consumer.push.len();
                consumer.cursor = consumer.cursor.wrapping_add(1);

                if consumer.push[index].send(delivery).is_err() {
                    debug!(consumer = %name, "push receiver closed mid-dispatch");
                }
            }
        }
    }

    fn ack(&mut self, consumer_name: &str, sequence: u64) -> Result<(), TransportError> {
        let consumer = self
            .consumers
            .get_mut(consumer_name)
            .ok_or_else(|| not_found(ResourceKind::Consumer, consumer_name))?;

        let acked: Vec<u64> = match consumer.config.ack_policy {
            AckPolicy::All => consumer.ack_pending.range(..=sequence).copied().collect(),
            AckPolicy::Explicit | AckPolicy::None => consumer
                .ack_pending
                .contains(&sequence)
                .then_some(sequence)
                .into_iter()
                .collect(),
        };

        for sequence in acked {
            consumer.ack_pending.remove(&sequence);

            if self.config.retention == RetentionPolicy::WorkQueue {
                self.messages.remove(&sequence);
            }
        }

        Ok(())
    }
}

impl Streams {
    fn overlapping(&self, config: &StreamConfig) -> bool {
        self.streams
            .values()
            .filter(|other| other.config.name != config.name)
            .flat_map(|other| &other.config.subjects)
            .any(|taken| {
                config
                    .subjects
                    .iter()
                    .any(|subject| subjects_overlap(taken, subject))
            })
    }

    fn stream(&self, name: &str) -> Result<&StreamState, TransportError> {
        self.streams
            .get(name)
            .ok_or_else(|| not_found(ResourceKind::Stream, name))
    }

    fn stream_mut(&mut self, name: &str) -> Result<&mut StreamState, TransportError> {
        self.streams
            .get_mut(name)
            .ok_or_else(|| not_found(ResourceKind::Stream, name))
    }

    fn create_stream(&mut self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        if let Some(existing) = self.streams.get(&config.name) {
            return if existing.config == config {
                Ok(existing.info())
            } else {
                Err(TransportError::AlreadyExists {
                    kind: ResourceKind::Stream,
                    name: config.name,
                })
            };
        }

        if self.overlapping(&config) {
            return Err(TransportError::JetStream(format!(
                "subjects of stream {} overlap with an existing stream",
                config.name
            )));
        }

        let state = StreamState {
            config,
            messages: BTreeMap::new(),
            last_sequence: 0,
            consumers: BTreeMap::new(),
        };
        let info = state.info();
        self.streams.insert(info.config.name.clone(), state);

        Ok(info)
    }

    fn update_stream(&mut self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        if self.overlapping(&config) {
            return Err(TransportError::JetStream(format!(
                "subjects of stream {} overlap with an existing stream",
                config.name
            )));
        }

        let stream = self.stream_mut(&config.name)?;
        stream.config = config;

        Ok(stream.info())
    }

    fn create_consumer(
        &mut self,
        stream_name: &str,
        config: ConsumerConfig,
        ephemeral: bool,
    ) -> Result<String, TransportError> {
        let stream = self.stream_mut(stream_name)?;

        if !config.filter_subject.is_empty()
            && !stream
                .config
                .subjects
                .iter()
                .any(|subject| subjects_overlap(subject, &config.filter_subject))
        {
            return Err(TransportError::JetStream(format!(
                "filter subject {} is not captured by stream {stream_name}",
                config.filter_subject
            )));
        }

        let name = match &config.durable_name {
            Some(name) => name.clone(),
            None => Uuid::new_v4().simple().to_string(),
        };

        if let Some(existing) = stream.consumers.get(&name) {
            return if existing.config == config {
                Ok(name)
            } else {
                Err(TransportError::AlreadyExists {
                    kind: ResourceKind::Consumer,
                    name,
                })
            };
        }

        stream
            .consumers
            .insert(name.clone(), ConsumerState::new(config, ephemeral));

        Ok(name)
    }

    fn store(
        &mut self,
        transport: &MemoryTransport,
        subject: &str,
        payload: &Bytes,
    ) -> Result<Option<PublishAck>, TransportError> {
        let Some(stream) = self.streams.values_mut().find(|stream| {
            stream
                .config
                .subjects
                .iter()
                .any(|pattern| subject_matches(pattern, subject))
        }) else {
            return Ok(None);
        };

        let max_size = usize::try_from(stream.config.max_message_size).ok();
        if max_size.is_some_and(|max| payload.len() > max) {
            return Err(TransportError::Publish(format!(
                "message size exceeds maximum allowed for stream {}",
                stream.config.name
            )));
        }

        stream.last_sequence += 1;
        let sequence = stream.last_sequence;
        stream.messages.insert(
            sequence,
            StoredMessage {
                subject: subject.to_string(),
                payload: payload.clone(),
            },
        );

        if let Ok(max_messages) = usize::try_from(stream.config.max_messages) {
            while stream.messages.len() > max_messages {
                stream.messages.pop_first();
            }
        }

        stream.dispatch(transport);

        Ok(Some(PublishAck {
            stream: stream.config.name.clone(),
            sequence,
            duplicate: false,
        }))
    }
}

struct MemoryAcker {
    transport: MemoryTransport,
    stream: String,
    consumer: String,
    sequence: u64,
}

impl Acker for MemoryAcker {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            self.transport
                .inner
                .streams
                .lock()
                .stream_mut(&self.stream)?
                .ack(&self.consumer, self.sequence)
        })
    }
}

impl MemoryTransport {
    /// Stores a core publish in whichever stream captures its subject.
    pub(crate) fn capture(
        &self,
        subject: &str,
        payload: &Bytes,
    ) -> Result<Option<PublishAck>, TransportError> {
        let ack = self.inner.streams.lock().store(self, subject, payload)?;

        if ack.is_some() {
            self.inner.stored.notify_waiters();
        }

        Ok(ack)
    }
}

#[async_trait]
impl JetStreamBackend for MemoryTransport {
    async fn stream_info(&self, name: &str) -> Result<Option<StreamInfo>, TransportError> {
        Ok(self.inner.streams.lock().streams.get(name).map(StreamState::info))
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        self.inner.streams.lock().create_stream(config)
    }

    async fn update_stream(&self, config: StreamConfig) -> Result<StreamInfo, TransportError> {
        self.inner.streams.lock().update_stream(config)
    }

    async fn delete_stream(&self, name: &str) -> Result<(), TransportError> {
        self.inner
            .streams
            .lock()
            .streams
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Stream, name))
    }

    async fn consumer_info(
        &self,
        stream: &str,
        name: &str,
    ) -> Result<Option<ConsumerInfo>, TransportError> {
        Ok(self
            .inner
            .streams
            .lock()
            .streams
            .get(stream)
            .and_then(|stream| stream.consumer_info(name)))
    }

    async fn create_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, TransportError> {
        if config.durable_name.is_none() {
            return Err(TransportError::JetStream(
                "durable consumers need a durable name".to_string(),
            ));
        }

        let mut streams = self.inner.streams.lock();
        let name = streams.create_consumer(stream, config, false)?;

        streams
            .stream(stream)?
            .consumer_info(&name)
            .ok_or_else(|| not_found(ResourceKind::Consumer, &name))
    }

    async fn publish_to_stream(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError> {
        let message = Message {
            subject,
            reply: None,
            payload,
        };
        self.inner.router.lock().route(&message);

        self.capture(&message.subject, &message.payload)?
            .ok_or(TransportError::NoResponders)
    }

    async fn consume(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<DeliveryStream, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let ephemeral = config.durable_name.is_none();

        let mut streams = self.inner.streams.lock();
        let existing = config.durable_name.clone().filter(|name| {
            streams
                .stream(stream)
                .is_ok_and(|state| state.consumers.contains_key(name))
        });
        let name = match existing {
            Some(name) => name,
            None => streams.create_consumer(stream, config, ephemeral)?,
        };

        let state = streams.stream_mut(stream)?;
        if let Some(consumer) = state.consumers.get_mut(&name) {
            consumer.push.push(sender);
        }
        state.dispatch(self);
        drop(streams);

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn fetch(
        &self,
        stream: &str,
        consumer: &str,
        batch: usize,
        expires: Duration,
    ) -> Result<Vec<Delivery>, TransportError> {
        let deadline = tokio::time::Instant::now() + expires;

        loop {
            let stored = self.inner.stored.notified();
            tokio::pin!(stored);
            stored.as_mut().enable();

            let deliveries = {
                let mut streams = self.inner.streams.lock();
                let state = streams.stream_mut(stream)?;
                if !state.consumers.contains_key(consumer) {
                    return Err(not_found(ResourceKind::Consumer, consumer));
                }
                state.take_pending(self, consumer, batch)
            };

            if !deliveries.is_empty() {
                return Ok(deliveries);
            }

            if tokio::time::timeout_at(deadline, stored).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}
