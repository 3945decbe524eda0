use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Kind of durable resource an operation referred to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// A stream.
    Stream,

    /// A consumer on a stream.
    Consumer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// Which payload failed to encode or decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeStage {
    /// The typed request.
    Request,

    /// The response envelope.
    Envelope,

    /// The `data` field of a successful envelope.
    ResponseData,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Envelope => f.write_str("response envelope"),
            Self::ResponseData => f.write_str("response data"),
        }
    }
}

/// Errors returned by the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid connection parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The bus could not be reached.
    #[error("failed to connect to {url}: {source}")]
    Connection {
        /// Endpoint that was dialed.
        url: String,

        /// Underlying transport failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A namespace was set to the empty string.
    #[error("namespace can not be empty")]
    EmptyNamespace,

    /// A stream name is empty or holds `.`, `*`, `>` or whitespace.
    #[error("invalid stream name {0:?}: must be non-empty and not contain '.', '*', '>' or whitespace")]
    InvalidStreamName(String),

    /// A referenced stream or consumer does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,

        /// Resource name.
        name: String,
    },

    /// Nothing is subscribed to the subject.
    #[error("no responders available for {subject}")]
    NoResponders {
        /// Fully-qualified subject of the request.
        subject: String,
    },

    /// No reply arrived within the request timeout.
    #[error("request to {subject} timed out after {timeout:?}")]
    Timeout {
        /// Fully-qualified subject of the request.
        subject: String,

        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A payload could not be serialized.
    #[error("failed to encode {stage}: {source}")]
    Encode {
        /// Payload that failed.
        stage: DecodeStage,

        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be deserialized.
    #[error("failed to decode {stage}: {source}")]
    Decode {
        /// Payload that failed.
        stage: DecodeStage,

        /// Deserializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The handler reported a failure. Displays the handler's message verbatim.
    #[error("{0}")]
    Application(String),

    /// Any other transport failure.
    #[error("{context}: {source}")]
    Transport {
        /// Operation that failed.
        context: String,

        /// Transport error.
        #[source]
        source: TransportError,
    },
}

impl Error {
    pub(crate) fn transport(context: impl Into<String>, source: TransportError) -> Self {
        match source {
            TransportError::NotFound { kind, name } => Self::NotFound { kind, name },
            source => Self::Transport {
                context: context.into(),
                source,
            },
        }
    }

    /// Whether the error means nobody answered the request.
    #[must_use]
    pub const fn is_unanswered(&self) -> bool {
        matches!(self, Self::NoResponders { .. } | Self::Timeout { .. })
    }
}
