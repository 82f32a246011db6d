use crate::dispatch::{DispatchError, ErrorReceiver};
use crate::transport::TransportSubscription;

/// A live subscription together with its error channel.
///
/// Messages that fail to decode or dispatch show up here instead of being
/// dropped. An undrained channel never holds up delivery; failures that do
/// not fit are counted in [`Self::dropped_errors`].
#[derive(Debug)]
pub struct Subscription<S>
where
    S: TransportSubscription,
{
    handle: S,
    errors: ErrorReceiver,
}

impl<S> Subscription<S>
where
    S: TransportSubscription,
{
    pub(crate) const fn new(handle: S, errors: ErrorReceiver) -> Self {
        Self { handle, errors }
    }

    /// The subject being listened on.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.handle.subject()
    }

    /// The transport's handle.
    #[must_use]
    pub const fn handle(&self) -> &S {
        &self.handle
    }

    /// Waits for the next dispatch failure.
    ///
    /// Returns `None` once the transport has ended the subscription.
    pub async fn next_error(&mut self) -> Option<DispatchError> {
        self.errors.recv().await
    }

    /// The next dispatch failure, if one is queued.
    pub fn try_next_error(&mut self) -> Option<DispatchError> {
        self.errors.try_recv()
    }

    /// Failures discarded because the error channel was full.
    #[must_use]
    pub fn dropped_errors(&self) -> u64 {
        self.errors.dropped()
    }

    /// Gives up the error channel and returns the transport's handle.
    #[must_use]
    pub fn into_handle(self) -> S {
        self.handle
    }
}
