use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for transport errors.
///
/// The façade only needs to tell two failure classes apart; everything else
/// is passed through opaquely.
pub trait TransportError: Debug + Error + Send + Sync + 'static {
    /// Whether the error reports a stream that does not exist.
    fn is_not_found(&self) -> bool;

    /// Whether the error reports that a stream refused another consumer.
    fn is_consumer_limit_exceeded(&self) -> bool;
}

/// Maximum number of concurrent consumers a stream admits.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ConsumerLimit {
    /// Any number of consumers, each receiving every message.
    #[default]
    Unbounded,

    /// A single owner at a time.
    Single,
}

impl ConsumerLimit {
    /// The numeric limit, `None` when unbounded.
    #[must_use]
    pub const fn max_consumers(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Single => Some(1),
        }
    }

    /// Whether a stream with `live` consumers may accept one more.
    #[must_use]
    pub const fn admits(self, live: usize) -> bool {
        match self.max_consumers() {
            None => true,
            Some(max) => live < max,
        }
    }
}

/// Where a new subscription starts reading.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Replay {
    /// Only messages published after the subscription was created.
    #[default]
    Tail,

    /// The last stored message on the subject, then everything after it.
    LastOnly,
}

/// Desired shape of a stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamConfig {
    /// Unique stream name.
    pub name: String,

    /// Subjects bound to the stream.
    pub subjects: BTreeSet<String>,

    /// Consumer fan-out limit.
    pub consumer_limit: ConsumerLimit,
}

impl StreamConfig {
    /// Creates a new stream configuration.
    pub fn new<N, I, S>(name: N, subjects: I, consumer_limit: ConsumerLimit) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            subjects: subjects.into_iter().map(Into::into).collect(),
            consumer_limit,
        }
    }

    /// Whether an existing stream already covers this configuration.
    #[must_use]
    pub fn is_satisfied_by(&self, info: &StreamInfo) -> bool {
        self.consumer_limit == info.consumer_limit && self.subjects.is_subset(&info.subjects)
    }

    /// This configuration with the existing stream's subjects folded in.
    #[must_use]
    pub fn merged_with(mut self, info: &StreamInfo) -> Self {
        self.subjects.extend(info.subjects.iter().cloned());
        self
    }
}

/// Metadata about a stream as reported by the transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StreamInfo {
    /// Stream name.
    pub name: String,

    /// Subjects bound to the stream.
    pub subjects: BTreeSet<String>,

    /// Consumer fan-out limit.
    pub consumer_limit: ConsumerLimit,

    /// Number of stored messages.
    pub messages: u64,

    /// Sequence of the oldest stored message.
    pub first_sequence: u64,

    /// Sequence of the newest stored message.
    pub last_sequence: u64,

    /// Number of live consumers.
    pub consumers: usize,
}

/// Acknowledgement of a stored message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PubAck {
    /// Stream the message landed in.
    pub stream: String,

    /// Sequence assigned to the message.
    pub sequence: u64,
}

/// A message pushed to a subscription.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Subject the message was published on.
    pub subject: String,

    /// Reply subject attached by the publisher, if any.
    pub reply: Option<String>,

    /// Raw payload.
    pub payload: Bytes,

    /// Stream sequence of the message.
    pub sequence: u64,
}

/// Receives messages pushed by a transport subscription.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// Handles one delivered message.
    async fn deliver(&self, delivery: Delivery);
}

/// A live subscription owned by a transport.
pub trait TransportSubscription: Debug + Send + Sync + 'static {
    /// The subject (or subject filter) the subscription listens on.
    fn subject(&self) -> &str;
}

/// An append-only, subject-addressed message log with push subscriptions.
#[async_trait]
pub trait LogTransport: Clone + Debug + Send + Sync + 'static {
    /// The error type for the transport.
    type Error: TransportError;

    /// Handle for a live subscription.
    type Subscription: TransportSubscription;

    /// Creates the stream, or updates it to exactly the given configuration.
    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Self::Error>;

    /// Deletes a stream and its messages. Succeeds if the stream is absent.
    async fn delete_stream(&self, name: &str) -> Result<(), Self::Error>;

    /// Removes all messages from a stream.
    async fn purge_stream(&self, name: &str) -> Result<(), Self::Error>;

    /// Reports stream metadata, or a not-found error.
    async fn stream_info(&self, name: &str) -> Result<StreamInfo, Self::Error>;

    /// Appends a message to whichever stream binds the subject.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PubAck, Self::Error>;

    /// Starts pushing messages on the subject to the handler.
    async fn subscribe<H>(
        &self,
        subject: &str,
        replay: Replay,
        handler: H,
    ) -> Result<Self::Subscription, Self::Error>
    where
        H: DeliveryHandler;

    /// Stops a subscription and releases its consumer slot.
    async fn unsubscribe(&self, subscription: Self::Subscription) -> Result<(), Self::Error>;

    /// Drains outstanding publishes.
    async fn flush(&self) -> Result<(), Self::Error>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<(), Self::Error>;
}
