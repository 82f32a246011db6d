use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::delivery::ResolveError;
use crate::dispatch::InvalidHandler;
use crate::transport::TransportError;

/// Errors returned by the messaging façade.
#[derive(Debug, Error)]
pub enum Error<TE>
where
    TE: TransportError,
{
    /// The pub-sub config has no topic.
    #[error("pub-sub config lost: topic must not be empty")]
    MissingConfig,

    /// Unknown publish mode.
    #[error("illegal pub-sub mode: {0:?}")]
    IllegalMode(String),

    /// Unknown integrity policy.
    #[error("illegal pub-sub integrity: {0:?}")]
    IllegalIntegrity(String),

    /// The transport rejected an operation.
    #[error(transparent)]
    Transport(TE),

    /// A peer-to-peer stream already has its single consumer.
    #[error("maximum consumers limit reached for {0}")]
    ConsumerLimitExceeded(String),

    /// Payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Handler registration was rejected.
    #[error(transparent)]
    InvalidHandler(#[from] InvalidHandler),

    /// No reply arrived before the deadline.
    #[error("no reply on {subject} within {timeout:?}")]
    Timeout {
        /// Request subject.
        subject: String,

        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The caller cancelled the exchange.
    #[error("exchange on {0} was cancelled")]
    Cancelled(String),

    /// The transport ended the subscription before a message arrived.
    #[error("subscription on {0} closed before a message arrived")]
    SubscriptionClosed(String),
}

impl<TE> Error<TE>
where
    TE: TransportError,
{
    /// Classifies a failed subscribe, lifting consumer-limit rejections.
    pub(crate) fn from_subscribe(error: TE, subject: &str) -> Self {
        if error.is_consumer_limit_exceeded() {
            Self::ConsumerLimitExceeded(subject.to_string())
        } else {
            Self::Transport(error)
        }
    }
}

impl<TE> From<ResolveError> for Error<TE>
where
    TE: TransportError,
{
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::IllegalMode(mode) => Self::IllegalMode(mode),
            ResolveError::IllegalIntegrity(integrity) => Self::IllegalIntegrity(integrity),
        }
    }
}
