/// How a stream decides when a message may be removed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetentionPolicy {
    /// Kept until stream limits are hit.
    Limits,

    /// Kept while any consumer still has interest.
    Interest,

    /// Removed once one consumer acknowledges it.
    #[default]
    WorkQueue,
}

/// How a consumer expects deliveries to be acknowledged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AckPolicy {
    /// Every delivery is acknowledged individually.
    #[default]
    Explicit,

    /// Acknowledging a delivery acknowledges everything before it.
    All,

    /// Deliveries are never acknowledged.
    None,
}

/// Stream settings. Limits of `-1` mean unlimited.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamConfig {
    /// Stream name.
    pub name: String,

    /// Subjects captured by the stream.
    pub subjects: Vec<String>,

    /// Retention policy.
    pub retention: RetentionPolicy,

    /// Maximum number of consumers.
    pub max_consumers: i32,

    /// Maximum number of stored messages.
    pub max_messages: i64,

    /// Maximum size of one message in bytes.
    pub max_message_size: i32,

    /// Whether publishes skip the acknowledgment from the server.
    pub no_ack: bool,
}

impl StreamConfig {
    /// Work-queue stream with no limits that acknowledges publishes.
    #[must_use]
    pub const fn work_queue(name: String, subjects: Vec<String>) -> Self {
        Self {
            name,
            subjects,
            retention: RetentionPolicy::WorkQueue,
            max_consumers: -1,
            max_messages: -1,
            max_message_size: -1,
            no_ack: false,
        }
    }
}

/// Snapshot of a stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamInfo {
    /// Current configuration.
    pub config: StreamConfig,

    /// Messages currently stored.
    pub messages: u64,

    /// Consumers currently attached.
    pub consumer_count: usize,
}

/// Consumer settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerConfig {
    /// Durable name. `None` creates an ephemeral consumer.
    pub durable_name: Option<String>,

    /// Only messages on this subject are delivered. Empty means all.
    pub filter_subject: String,

    /// Acknowledgment policy.
    pub ack_policy: AckPolicy,
}

impl ConsumerConfig {
    /// Durable, explicitly acknowledged consumer filtered to one subject.
    #[must_use]
    pub const fn durable(name: String, filter_subject: String) -> Self {
        Self {
            durable_name: Some(name),
            filter_subject,
            ack_policy: AckPolicy::Explicit,
        }
    }

    /// Ephemeral, explicitly acknowledged consumer filtered to one subject.
    #[must_use]
    pub const fn ephemeral(filter_subject: String) -> Self {
        Self {
            durable_name: None,
            filter_subject,
            ack_policy: AckPolicy::Explicit,
        }
    }
}

/// Snapshot of a consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerInfo {
    /// Stream the consumer reads from.
    pub stream_name: String,

    /// Consumer name.
    pub name: String,

    /// Current configuration.
    pub config: ConsumerConfig,

    /// Messages not yet delivered to this consumer.
    pub num_pending: u64,

    /// Deliveries awaiting acknowledgment.
    pub num_ack_pending: usize,
}

/// Server acknowledgment of a stream publish.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishAck {
    /// Stream that stored the message.
    pub stream: String,

    /// Sequence assigned to the message.
    pub sequence: u64,

    /// Whether the message was a duplicate.
    pub duplicate: bool,
}
