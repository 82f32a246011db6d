use std::fmt::Display;

use async_nats::jetstream;
use async_nats::jetstream::stream::Stream as JetStream;
use futures::{Stream, StreamExt};
use neuron_messaging::transport::{Delivery, DeliveryHandler, TransportSubscription};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle for a push consumer bound to a JetStream stream.
#[derive(Clone, Debug)]
pub struct NatsSubscription {
    subject: String,
    consumer: String,
    stream: JetStream,
    stop: CancellationToken,
}

impl NatsSubscription {
    pub(crate) const fn new(
        subject: String,
        consumer: String,
        stream: JetStream,
        stop: CancellationToken,
    ) -> Self {
        Self {
            subject,
            consumer,
            stream,
            stop,
        }
    }

    /// The server-assigned consumer name.
    #[must_use]
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub(crate) const fn stream(&self) -> &JetStream {
        &self.stream
    }

    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }
}

impl TransportSubscription for NatsSubscription {
    fn subject(&self) -> &str {
        &self.subject
    }
}

fn to_delivery(message: &jetstream::Message) -> Delivery {
    Delivery {
        subject: message.message.subject.to_string(),
        reply: message.message.reply.as_ref().map(ToString::to_string),
        payload: message.message.payload.clone(),
        sequence: message.info().map_or(0, |info| info.stream_sequence),
    }
}

/// Forwards consumer messages to the handler until stopped.
pub fn spawn<S, E, H>(subject: String, messages: S, stop: CancellationToken, handler: H)
where
    S: Stream<Item = Result<jetstream::Message, E>> + Send + 'static,
    E: Display + Send + 'static,
    H: DeliveryHandler,
{
    tokio::spawn(async move {
        let mut messages = Box::pin(messages);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                next = messages.next() => match next {
                    Some(Ok(message)) => handler.deliver(to_delivery(&message)).await,
                    Some(Err(error)) => warn!(subject, %error, "failed to receive message"),
                    None => break,
                },
            }
        }

        debug!(subject, "subscription stopped");
    });
}
