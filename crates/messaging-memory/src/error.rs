use neuron_messaging::transport::TransportError;
use thiserror::Error;

/// Error type for in-memory transport operations.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// Stream names must be non-empty and free of subject syntax.
    #[error("invalid stream name {0:?}")]
    InvalidStreamName(String),

    /// Subjects must be non-empty dot-separated tokens.
    #[error("invalid subject {0:?}")]
    InvalidSubject(String),

    /// The stream already has as many consumers as it admits.
    #[error("maximum consumers limit reached for stream {0}")]
    MaximumConsumers(String),

    /// No stream binds the subject.
    #[error("no stream matches subject {0}")]
    NoStreamForSubject(String),

    /// The stream does not exist.
    #[error("stream {0} not found")]
    StreamNotFound(String),

    /// A subject is already bound to another stream.
    #[error("subject {subject} is already bound to stream {stream}")]
    SubjectOverlap {
        /// The contested subject.
        subject: String,

        /// The stream holding it.
        stream: String,
    },
}

impl TransportError for Error {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::StreamNotFound(_))
    }

    fn is_consumer_limit_exceeded(&self) -> bool {
        matches!(self, Self::MaximumConsumers(_))
    }
}
