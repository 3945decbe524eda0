mod error;

pub use error::HandlerError;

use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::subject::Namespacing;
use crate::transport::{Message, Subscription, Transport};
use crate::{Envelope, Error, Gateway};

/// Future produced by a queue handler adapter.
pub type HandlerFuture = BoxFuture<'static, Envelope>;

/// Adapter from a raw request payload to a reply envelope for service `S`.
pub type HandlerFn<S> = fn(Arc<S>, Bytes) -> HandlerFuture;

/// One queue entry: a subject, the worker group that serves it and the
/// adapter that handles its messages.
pub struct QueueDesc<S>
where
    S: ?Sized,
{
    /// Subject, before namespacing.
    pub subject: String,

    /// Queue group name. Empty means the resolved subject is used.
    pub worker: String,

    /// Handler adapter.
    pub handle: HandlerFn<S>,
}

impl<S: ?Sized> Clone for QueueDesc<S> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            worker: self.worker.clone(),
            handle: self.handle,
        }
    }
}

impl<S: ?Sized> Debug for QueueDesc<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDesc")
            .field("subject", &self.subject)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

/// Everything one service registers at startup, in order.
pub struct ServiceDesc<S>
where
    S: ?Sized,
{
    name: String,
    queues: Vec<QueueDesc<S>>,
}

impl<S: ?Sized> ServiceDesc<S> {
    /// Empty descriptor for the service `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queues: Vec::new(),
        }
    }

    /// Appends a queue entry.
    #[must_use]
    pub fn queue(
        mut self,
        subject: impl Into<String>,
        worker: impl Into<String>,
        handle: HandlerFn<S>,
    ) -> Self {
        self.queues.push(QueueDesc {
            subject: subject.into(),
            worker: worker.into(),
            handle,
        });
        self
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue entries in registration order.
    pub fn queues(&self) -> &[QueueDesc<S>] {
        &self.queues
    }
}

impl<S: ?Sized> Debug for ServiceDesc<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDesc")
            .field("name", &self.name)
            .field("queues", &self.queues)
            .finish()
    }
}

/// Builds a handler adapter body: decodes `payload` as `Req`, runs `handler`
/// and wraps its outcome in an envelope.
///
/// Undecodable payloads and handler errors both produce failure envelopes so
/// the caller always hears back.
pub fn handle_typed<Req, Res, E, F, Fut>(payload: Bytes, handler: F) -> HandlerFuture
where
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: FnOnce(Req) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Res, E>> + Send + 'static,
{
    Box::pin(async move {
        let request = match serde_json::from_slice::<Req>(&payload) {
            Ok(request) => request,
            Err(error) => return Envelope::failure(format!("failed to decode request: {error}")),
        };

        match handler(request).await {
            Ok(response) => Envelope::success(&response).unwrap_or_else(|error| {
                Envelope::failure(format!("failed to encode response: {error}"))
            }),
            Err(error) => Envelope::failure(error.to_string()),
        }
    })
}

/// Live queue handlers started by [`Gateway::register_server`].
#[derive(Debug)]
pub struct Registration {
    subjects: Vec<String>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Registration {
    /// Fully-qualified subjects being served.
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Stops taking messages and waits for in-flight handlers to reply.
    pub async fn shutdown(&self) {
        info!(subjects = ?self.subjects, "shutting down queue handlers");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

impl<T> Gateway<T>
where
    T: Transport,
{
    /// Subscribes every queue in `desc` as a queue-group member and serves it
    /// with `service`.
    ///
    /// # Errors
    ///
    /// Returns the first subscribe failure. Queues registered before it stay
    /// live.
    pub async fn register_server<S>(
        &self,
        desc: ServiceDesc<S>,
        service: Arc<S>,
    ) -> Result<Registration, Error>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();
        let mut subjects = Vec::with_capacity(desc.queues.len());

        for queue in desc.queues {
            let subject = self.resolve_subject(&queue.subject, &Namespacing::Active);
            let queue_group = if queue.worker.is_empty() {
                subject.clone()
            } else {
                queue.worker
            };

            let subscription = self
                .queue_subscribe(&subject, &queue_group, Namespacing::Bare)
                .await?;

            info!(service = %desc.name, %subject, %queue_group, "queue handler registered");

            task_tracker.spawn(self.clone().process_messages(
                subscription,
                queue.handle,
                service.clone(),
                shutdown_token.clone(),
                task_tracker.clone(),
            ));

            subjects.push(subject);
        }

        Ok(Registration {
            subjects,
            shutdown_token,
            task_tracker,
        })
    }

    async fn process_messages<S>(
        self,
        mut subscription: Subscription,
        handle: HandlerFn<S>,
        service: Arc<S>,
        shutdown_token: CancellationToken,
        task_tracker: TaskTracker,
    ) where
        S: ?Sized + Send + Sync + 'static,
    {
        loop {
            tokio::select! {
                biased;
                () = shutdown_token.cancelled() => {
                    debug!("shutdown token cancelled, exiting queue processing loop");
                    break;
                }
                message = subscription.next() => {
                    let Some(message) = message else {
                        warn!("subscription closed, exiting queue processing loop");
                        break;
                    };

                    task_tracker.spawn(self.clone().respond(message, handle, service.clone()));
                }
            }
        }
    }

    async fn respond<S>(self, message: Message, handle: HandlerFn<S>, service: Arc<S>)
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let Some(reply_subject) = message.reply else {
            warn!(subject = %message.subject, "dropping message without reply subject");
            return;
        };

        let envelope = handle(service, message.payload).await;

        if !envelope.success {
            debug!(subject = %message.subject, error = %envelope.message, "handler failed");
        }

        if let Err(e) = self.reply(&reply_subject, &envelope).await {
            error!(subject = %message.subject, "failed to send reply: {e}");
        }
    }
}
