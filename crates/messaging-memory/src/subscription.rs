use neuron_messaging::transport::{Delivery, DeliveryHandler, TransportSubscription};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Handle for an in-memory subscription.
///
/// Dropping the handle does not stop the subscription; pass it to
/// `unsubscribe` for that.
#[derive(Clone, Debug)]
pub struct MemorySubscription {
    id: u64,
    stream: String,
    subject: String,
}

impl MemorySubscription {
    pub(crate) const fn new(id: u64, stream: String, subject: String) -> Self {
        Self {
            id,
            stream,
            subject,
        }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// The stream the subscription reads from.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl TransportSubscription for MemorySubscription {
    fn subject(&self) -> &str {
        &self.subject
    }
}

/// Runs the consumer loop until the stop sender or the delivery sender is
/// dropped.
pub fn spawn<H>(
    subject: String,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
    mut stop_receiver: watch::Receiver<()>,
    handler: H,
) where
    H: DeliveryHandler,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop_receiver.changed() => {
                    break;
                }
                delivery = receiver.recv() => {
                    match delivery {
                        Some(delivery) => handler.deliver(delivery).await,
                        None => break,
                    }
                }
            }
        }

        debug!(subject, "subscription stopped");
    });
}
