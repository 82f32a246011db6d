use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::sync::watch;

/// A destination the latest decoded value is written into.
///
/// Clones share the same cell.
pub struct Slot<T> {
    sender: Arc<watch::Sender<Option<T>>>,
}

impl<T> Slot<T> {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Whether a value has been written.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub(crate) fn set(&self, value: T) {
        self.sender.send_replace(Some(value));
    }
}

impl<T> Slot<T>
where
    T: Clone,
{
    /// The latest value, if any.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.sender.borrow().clone()
    }

    /// Waits until a value is present and returns it.
    pub async fn wait(&self) -> Option<T> {
        let mut receiver = self.sender.subscribe();
        let value = receiver.wait_for(Option::is_some).await.ok()?;

        value.clone()
    }

    /// Waits for the next write after this call and returns it.
    pub async fn next(&self) -> Option<T> {
        let mut receiver = self.sender.subscribe();
        receiver.changed().await.ok()?;

        receiver.borrow_and_update().clone()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("set", &self.is_set())
            .finish()
    }
}
