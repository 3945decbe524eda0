use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::subject::Namespacing;
use crate::transport::{Subscription, Transport, TransportError};
use crate::{DecodeStage, Envelope, Error, Gateway};

impl<T> Gateway<T>
where
    T: Transport,
{
    /// Calls the handler on `subject` under the active namespace.
    ///
    /// # Errors
    ///
    /// See [`Gateway::call_with`].
    pub async fn call<Req, Res>(&self, subject: &str, request: &Req) -> Result<Res, Error>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        self.call_with(subject, Namespacing::Active, request).await
    }

    /// Calls the handler on `subject`, namespaced as requested, and waits for
    /// its typed reply. Never retries.
    ///
    /// # Errors
    ///
    /// - [`Error::NoResponders`] or [`Error::Timeout`] when nobody answers.
    /// - [`Error::Application`] carrying the handler's message when it fails.
    /// - [`Error::Encode`] / [`Error::Decode`] for payloads that do not fit.
    pub async fn call_with<Req, Res>(
        &self,
        subject: &str,
        namespacing: Namespacing,
        request: &Req,
    ) -> Result<Res, Error>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let subject = self.resolve_subject(subject, &namespacing);
        let trace_id = Uuid::new_v4();
        let debug = self.config.debug;

        let payload = encode_request(request)?;

        if debug {
            info!(%trace_id, %subject, payload = %String::from_utf8_lossy(&payload), "request sent");
        }

        let timeout = self.request_timeout();
        let reply = self
            .transport
            .request(subject.clone(), payload, timeout)
            .await
            .map_err(|error| match error {
                TransportError::NoResponders => {
                    warn!(%trace_id, %subject, "no responders");
                    Error::NoResponders {
                        subject: subject.clone(),
                    }
                }
                TransportError::TimedOut => Error::Timeout {
                    subject: subject.clone(),
                    timeout,
                },
                error => Error::transport(format!("request to {subject}"), error),
            })?;

        if debug {
            info!(%trace_id, %subject, payload = %String::from_utf8_lossy(&reply.payload), "reply received");
        }

        let envelope = Envelope::from_bytes(&reply.payload)?;

        if debug {
            info!(
                %trace_id,
                %subject,
                success = envelope.success,
                message = %envelope.message,
                data = %envelope.data.as_ref().unwrap_or(&serde_json::Value::Null),
                "reply decoded"
            );
        }

        envelope.into_result()
    }

    /// Publishes `message` without waiting for an answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] or the transport failure.
    pub async fn publish<M>(
        &self,
        subject: &str,
        namespacing: Namespacing,
        message: &M,
    ) -> Result<(), Error>
    where
        M: Serialize + Sync,
    {
        let subject = self.resolve_subject(subject, &namespacing);
        let payload = encode_request(message)?;

        self.transport
            .publish(subject.clone(), payload)
            .await
            .map_err(|error| Error::transport(format!("publish to {subject}"), error))
    }

    /// Publishes `message` asking for the answer on `reply`.
    ///
    /// The reply subject is used exactly as given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] or the transport failure.
    pub async fn publish_request<M>(
        &self,
        subject: &str,
        reply: &str,
        namespacing: Namespacing,
        message: &M,
    ) -> Result<(), Error>
    where
        M: Serialize + Sync,
    {
        let subject = self.resolve_subject(subject, &namespacing);
        let payload = encode_request(message)?;

        self.transport
            .publish_with_reply(subject.clone(), reply.to_string(), payload)
            .await
            .map_err(|error| Error::transport(format!("publish request to {subject}"), error))
    }

    /// Sends `envelope` to a caller's reply subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] or the transport failure.
    pub async fn reply(&self, reply_subject: &str, envelope: &Envelope) -> Result<(), Error> {
        let payload = envelope.to_bytes().map_err(|source| Error::Encode {
            stage: DecodeStage::Envelope,
            source,
        })?;

        self.transport
            .publish(reply_subject.to_string(), payload)
            .await
            .map_err(|error| Error::transport(format!("reply to {reply_subject}"), error))
    }

    /// Raw subscription on a namespaced subject.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn subscribe(
        &self,
        subject: &str,
        namespacing: Namespacing,
    ) -> Result<Subscription, Error> {
        let subject = self.resolve_subject(subject, &namespacing);

        self.transport
            .subscribe(subject.clone())
            .await
            .map_err(|error| Error::transport(format!("subscribe to {subject}"), error))
    }

    /// Raw queue-group subscription on a namespaced subject.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn queue_subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        namespacing: Namespacing,
    ) -> Result<Subscription, Error> {
        let subject = self.resolve_subject(subject, &namespacing);

        self.transport
            .queue_subscribe(subject.clone(), queue_group.to_string())
            .await
            .map_err(|error| Error::transport(format!("queue subscribe to {subject}"), error))
    }
}

fn encode_request<M: Serialize>(message: &M) -> Result<Bytes, Error> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|source| Error::Encode {
            stage: DecodeStage::Request,
            source,
        })
}
