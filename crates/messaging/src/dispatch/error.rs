use std::error::Error;

use thiserror::Error;

/// Handler registration was rejected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InvalidHandler {
    /// Handlers take the value, optionally preceded by subject and reply.
    #[error("handler must take 1, 2 or 3 arguments, got {0}")]
    Arity(usize),

    /// A subscription dispatches to exactly one handler.
    #[error("exactly one handler must be registered, got {0}")]
    Count(usize),
}

/// A delivered message could not be handed to the subscriber.
#[derive(Debug, Error)]
#[error("failed to dispatch message {sequence} on {subject}: {source}")]
pub struct DispatchError {
    /// Subject the message arrived on.
    pub subject: String,

    /// Stream sequence of the message.
    pub sequence: u64,

    /// Underlying failure.
    #[source]
    pub source: Box<dyn Error + Send + Sync>,
}
