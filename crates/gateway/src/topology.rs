use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument};

use crate::jetstream::{
    ConsumerConfig, ConsumerInfo, Delivery, DeliveryStream, JetStreamBackend, PublishAck,
    StreamConfig, StreamInfo,
};
use crate::subject::{combine, generate_subject_names, merge_subjects, validate_stream_name};
use crate::transport::{Transport, TransportError};
use crate::{Error, Gateway, ResourceKind};

impl<T> Gateway<T>
where
    T: Transport + JetStreamBackend,
{
    /// Topology manager sharing this gateway's connection.
    pub fn jetstream(&self) -> JetStream<T> {
        JetStream {
            backend: self.transport.clone(),
        }
    }
}

/// Creates and inspects durable streams and consumers.
///
/// Stream and consumer subjects are addressed as `<stream>.<subject>` and are
/// not namespaced. Every entry point rejects stream names that are not a
/// single subject token with [`Error::InvalidStreamName`].
#[derive(Clone, Debug)]
pub struct JetStream<T>
where
    T: JetStreamBackend,
{
    backend: T,
}

impl<T> JetStream<T>
where
    T: JetStreamBackend,
{
    /// Creates a topology manager over `backend`.
    pub const fn new(backend: T) -> Self {
        Self { backend }
    }

    /// Creates the stream `name` capturing `<name>.<subject>` for every
    /// subject. Does nothing if the stream already exists.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    #[instrument(skip(self, subjects))]
    pub async fn ensure_stream<S>(&self, name: &str, subjects: &[S]) -> Result<StreamInfo, Error>
    where
        S: AsRef<str> + Sync,
    {
        if let Some(info) = self.stream_info(name).await? {
            debug!("stream already exists");
            return Ok(info);
        }

        let config =
            StreamConfig::work_queue(name.to_string(), generate_subject_names(name, subjects));

        match self.backend.create_stream(config).await {
            Ok(info) => {
                info!(subjects = ?info.config.subjects, "stream created");
                Ok(info)
            }
            Err(TransportError::AlreadyExists { .. }) => {
                debug!("stream created concurrently");
                self.existing_stream(name).await
            }
            Err(error) => Err(Error::transport(format!("create stream {name}"), error)),
        }
    }

    /// Adds `<name>.<subject>` for every subject to an existing stream.
    /// Subjects are only ever added; no update is sent if nothing is new.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the stream does not exist, otherwise the
    /// transport failure.
    #[instrument(skip(self, subjects))]
    pub async fn extend_stream_subjects<S>(
        &self,
        name: &str,
        subjects: &[S],
    ) -> Result<StreamInfo, Error>
    where
        S: AsRef<str> + Sync,
    {
        let info = self.existing_stream(name).await?;

        let merged = merge_subjects(
            &info.config.subjects,
            &generate_subject_names(name, subjects),
        );
        if merged == info.config.subjects {
            return Ok(info);
        }

        let mut config = info.config;
        config.subjects = merged;

        let info = self
            .backend
            .update_stream(config)
            .await
            .map_err(|error| Error::transport(format!("update stream {name}"), error))?;

        info!(subjects = ?info.config.subjects, "stream subjects extended");

        Ok(info)
    }

    /// Deletes a stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist, otherwise the
    /// transport failure.
    pub async fn delete_stream(&self, name: &str) -> Result<(), Error> {
        validate_stream_name(name)?;

        self.backend
            .delete_stream(name)
            .await
            .map_err(|error| Error::transport(format!("delete stream {name}"), error))?;

        info!(stream = %name, "stream deleted");

        Ok(())
    }

    /// Looks up a stream.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn stream_info(&self, name: &str) -> Result<Option<StreamInfo>, Error> {
        validate_stream_name(name)?;

        self.backend
            .stream_info(name)
            .await
            .map_err(|error| Error::transport(format!("stream info {name}"), error))
    }

    /// Creates a durable, explicitly acknowledged consumer filtered to
    /// `<stream>.<subject>`. Does nothing if `durable_name` already exists.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    #[instrument(skip(self))]
    pub async fn ensure_consumer(
        &self,
        stream: &str,
        subject: &str,
        durable_name: &str,
    ) -> Result<ConsumerInfo, Error> {
        if let Some(info) = self.consumer_info(stream, durable_name).await? {
            debug!("consumer already exists");
            return Ok(info);
        }

        let config = ConsumerConfig::durable(durable_name.to_string(), combine(stream, subject));

        match self.backend.create_consumer(stream, config).await {
            Ok(info) => {
                info!(filter_subject = %info.config.filter_subject, "consumer created");
                Ok(info)
            }
            Err(TransportError::AlreadyExists { .. }) => {
                debug!("consumer created concurrently");
                self.existing_consumer(stream, durable_name).await
            }
            Err(error) => Err(Error::transport(
                format!("create consumer {durable_name} on {stream}"),
                error,
            )),
        }
    }

    /// Looks up a consumer.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn consumer_info(
        &self,
        stream: &str,
        durable_name: &str,
    ) -> Result<Option<ConsumerInfo>, Error> {
        validate_stream_name(stream)?;

        self.backend
            .consumer_info(stream, durable_name)
            .await
            .map_err(|error| {
                Error::transport(format!("consumer info {durable_name} on {stream}"), error)
            })
    }

    /// Publishes `payload` on `<stream>.<subject>` and waits for the stream
    /// to store it.
    ///
    /// # Errors
    ///
    /// Returns the transport failure, including when no stream captures the
    /// subject.
    pub async fn publish(
        &self,
        stream: &str,
        subject: &str,
        payload: Bytes,
    ) -> Result<PublishAck, Error> {
        validate_stream_name(stream)?;
        let subject = combine(stream, subject);

        self.backend
            .publish_to_stream(subject.clone(), payload)
            .await
            .map_err(|error| Error::transport(format!("publish to {subject}"), error))
    }

    /// Receives every message on `<stream>.<subject>` through an ephemeral
    /// consumer.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn subscribe(&self, stream: &str, subject: &str) -> Result<DeliveryStream, Error> {
        validate_stream_name(stream)?;
        let config = ConsumerConfig::ephemeral(combine(stream, subject));

        self.backend
            .consume(stream, config)
            .await
            .map_err(|error| Error::transport(format!("subscribe to {stream}"), error))
    }

    /// Shares the messages on `<stream>.<subject>` between every caller using
    /// the same `queue`. The queue name is the durable consumer name.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn queue_subscribe(
        &self,
        stream: &str,
        subject: &str,
        queue: &str,
    ) -> Result<DeliveryStream, Error> {
        validate_stream_name(stream)?;
        let config = ConsumerConfig::durable(queue.to_string(), combine(stream, subject));

        self.backend
            .consume(stream, config)
            .await
            .map_err(|error| Error::transport(format!("queue subscribe {queue} to {stream}"), error))
    }

    /// Binds to the existing consumer `durable_name` for pull delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the consumer does not exist.
    pub async fn pull_subscribe(
        &self,
        stream: &str,
        subject: &str,
        durable_name: &str,
    ) -> Result<PullSubscription<T>, Error> {
        let info = self.existing_consumer(stream, durable_name).await?;

        Ok(PullSubscription {
            backend: self.backend.clone(),
            stream: stream.to_string(),
            consumer: info.name,
            subject: combine(stream, subject),
        })
    }

    async fn existing_stream(&self, name: &str) -> Result<StreamInfo, Error> {
        self.stream_info(name).await?.ok_or_else(|| Error::NotFound {
            kind: ResourceKind::Stream,
            name: name.to_string(),
        })
    }

    async fn existing_consumer(&self, stream: &str, name: &str) -> Result<ConsumerInfo, Error> {
        self.consumer_info(stream, name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: ResourceKind::Consumer,
                name: name.to_string(),
            })
    }
}

/// Pull handle on a durable consumer.
#[derive(Clone, Debug)]
pub struct PullSubscription<T>
where
    T: JetStreamBackend,
{
    backend: T,
    stream: String,
    consumer: String,
    subject: String,
}

impl<T> PullSubscription<T>
where
    T: JetStreamBackend,
{
    /// Combined subject this subscription was opened for.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Durable consumer name.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Fetches up to `batch` deliveries, waiting at most `expires`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the consumer was removed, otherwise the
    /// transport failure.
    pub async fn fetch(&self, batch: usize, expires: Duration) -> Result<Vec<Delivery>, Error> {
        self.backend
            .fetch(&self.stream, &self.consumer, batch, expires)
            .await
            .map_err(|error| Error::transport(format!("fetch from {}", self.consumer), error))
    }
}
