use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use super::DispatchError;

/// Sending half of a subscription's error channel.
///
/// Never waits: when the buffer is full the failure is counted and
/// dropped so delivery keeps going.
#[derive(Clone, Debug)]
pub struct ErrorReporter {
    sender: mpsc::Sender<DispatchError>,
    dropped: Arc<AtomicU64>,
}

/// Receiving half of a subscription's error channel.
#[derive(Debug)]
pub struct ErrorReceiver {
    receiver: mpsc::Receiver<DispatchError>,
    dropped: Arc<AtomicU64>,
}

/// Creates an error channel holding up to `buffer` failures.
pub fn error_channel(buffer: usize) -> (ErrorReporter, ErrorReceiver) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    (
        ErrorReporter {
            sender,
            dropped: Arc::clone(&dropped),
        },
        ErrorReceiver { receiver, dropped },
    )
}

impl ErrorReporter {
    /// Queues a failure without blocking the caller.
    pub fn report(&self, failure: DispatchError) {
        match self.sender.try_send(failure) {
            Ok(()) => {}
            Err(TrySendError::Full(failure)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    subject = %failure.subject,
                    sequence = failure.sequence,
                    dropped,
                    "error channel full, dropping failure"
                );
            }
            Err(TrySendError::Closed(failure)) => {
                error!(error = %failure, "subscription error channel closed");
            }
        }
    }
}

impl ErrorReceiver {
    /// Waits for the next queued failure.
    pub async fn recv(&mut self) -> Option<DispatchError> {
        self.receiver.recv().await
    }

    /// The next queued failure, if any.
    pub fn try_recv(&mut self) -> Option<DispatchError> {
        self.receiver.try_recv().ok()
    }

    /// Failures dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(sequence: u64) -> DispatchError {
        DispatchError {
            subject: "foo".to_string(),
            sequence,
            source: "bad payload".into(),
        }
    }

    #[test]
    fn test_full_channel_counts_dropped_failures() {
        let (reporter, mut receiver) = error_channel(1);

        reporter.report(failure(1));
        reporter.report(failure(2));
        reporter.report(failure(3));

        assert_eq!(receiver.dropped(), 2);
        assert_eq!(receiver.try_recv().map(|f| f.sequence), Some(1));
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (reporter, receiver) = error_channel(1);
        drop(receiver);

        reporter.report(failure(1));
    }
}
