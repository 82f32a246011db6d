use async_nats::ConnectErrorKind;
use async_nats::client::FlushErrorKind;
use async_nats::jetstream::consumer::StreamErrorKind;
use async_nats::jetstream::context::{
    CreateStreamErrorKind, DeleteStreamErrorKind, GetStreamByNameErrorKind, GetStreamErrorKind,
    PublishErrorKind,
};
use async_nats::jetstream::stream::{ConsumerErrorKind, PurgeErrorKind};
use async_nats::jetstream::{self, ErrorCode};
use neuron_messaging::transport::TransportError;
use thiserror::Error;

/// Error type for NATS transport operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not connect to the server.
    #[error("Failed to connect to nats: {0}")]
    Connect(ConnectErrorKind),

    /// Consumer create error.
    #[error("Failed to create consumer: {0}")]
    ConsumerCreate(ConsumerErrorKind),

    /// Consumer delete error.
    #[error("Failed to delete consumer: {0}")]
    ConsumerDelete(ConsumerErrorKind),

    /// Consumer message stream error.
    #[error("Failed to get consumer messages: {0}")]
    Messages(StreamErrorKind),

    /// Flush error.
    #[error("Failed to flush connection: {0}")]
    Flush(FlushErrorKind),

    /// The stream already has as many consumers as it admits.
    #[error("Maximum consumers limit reached for {0}")]
    MaximumConsumers(String),

    /// Publish error.
    #[error("Failed to publish: {0}")]
    Publish(PublishErrorKind),

    /// Stream create or update error.
    #[error("Failed to create stream: {0}")]
    StreamCreate(CreateStreamErrorKind),

    /// Stream delete error.
    #[error("Failed to delete stream: {0}")]
    StreamDelete(DeleteStreamErrorKind),

    /// Stream lookup error.
    #[error("Failed to get stream: {0}")]
    StreamGet(GetStreamErrorKind),

    /// Stream lookup by subject error.
    #[error("Failed to find stream for subject: {0}")]
    StreamLookup(GetStreamByNameErrorKind),

    /// The stream does not exist.
    #[error("Stream {0} not found")]
    StreamNotFound(String),

    /// Stream purge error.
    #[error("Failed to purge stream: {0}")]
    StreamPurge(PurgeErrorKind),
}

fn has_code(error: &jetstream::Error, code: ErrorCode) -> bool {
    error.error_code() == code
}

impl Error {
    pub(crate) fn stream_get(name: &str, kind: GetStreamErrorKind) -> Self {
        match kind {
            GetStreamErrorKind::JetStream(ref error)
                if has_code(error, ErrorCode::STREAM_NOT_FOUND) =>
            {
                Self::StreamNotFound(name.to_string())
            }
            kind => Self::StreamGet(kind),
        }
    }

    pub(crate) fn stream_delete(name: &str, kind: DeleteStreamErrorKind) -> Self {
        match kind {
            DeleteStreamErrorKind::JetStream(ref error)
                if has_code(error, ErrorCode::STREAM_NOT_FOUND) =>
            {
                Self::StreamNotFound(name.to_string())
            }
            kind => Self::StreamDelete(kind),
        }
    }

    pub(crate) fn stream_purge(name: &str, kind: PurgeErrorKind) -> Self {
        match kind {
            PurgeErrorKind::JetStream(ref error)
                if has_code(error, ErrorCode::STREAM_NOT_FOUND) =>
            {
                Self::StreamNotFound(name.to_string())
            }
            kind => Self::StreamPurge(kind),
        }
    }

    pub(crate) fn consumer_create(stream: &str, kind: ConsumerErrorKind) -> Self {
        match kind {
            ConsumerErrorKind::JetStream(ref error)
                if has_code(error, ErrorCode::MAXIMUM_CONSUMERS_LIMIT) =>
            {
                Self::MaximumConsumers(stream.to_string())
            }
            kind => Self::ConsumerCreate(kind),
        }
    }

    /// Whether deleting a consumer failed only because it was already gone.
    pub(crate) fn is_gone(kind: &ConsumerErrorKind) -> bool {
        matches!(
            kind,
            ConsumerErrorKind::JetStream(error)
                if has_code(error, ErrorCode::CONSUMER_NOT_FOUND)
                    || has_code(error, ErrorCode::STREAM_NOT_FOUND)
        )
    }
}

impl TransportError for Error {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::StreamNotFound(_))
    }

    fn is_consumer_limit_exceeded(&self) -> bool {
        matches!(self, Self::MaximumConsumers(_))
    }
}
