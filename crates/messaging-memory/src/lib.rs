//! In-memory implementation of the messaging log transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod stream;
mod subject;
mod subscription;

pub use error::Error;
pub use subscription::MemorySubscription;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use neuron_messaging::transport::{
    DeliveryHandler, LogTransport, PubAck, Replay, StreamConfig, StreamInfo,
};
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tracing::{debug, info};

use crate::stream::{Consumer, MemoryStream};

#[derive(Debug, Default)]
struct State {
    streams: BTreeMap<String, MemoryStream>,
    next_consumer: u64,
    closed: bool,
}

impl State {
    fn stream_for(&mut self, subject: &str) -> Result<&mut MemoryStream, Error> {
        self.streams
            .values_mut()
            .find(|stream| stream.binds(subject))
            .ok_or_else(|| Error::NoStreamForSubject(subject.to_string()))
    }
}

/// A log transport that keeps every stream in process memory.
///
/// Clones share the same streams.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self) -> Result<MutexGuard<'_, State>, Error> {
        let state = self.state.lock().await;

        if state.closed {
            return Err(Error::Closed);
        }

        Ok(state)
    }
}

fn validate_stream_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| matches!(c, '.' | '*' | '>') || c.is_whitespace())
    {
        return Err(Error::InvalidStreamName(name.to_string()));
    }

    Ok(())
}

#[async_trait]
impl LogTransport for MemoryTransport {
    type Error = Error;
    type Subscription = MemorySubscription;

    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Error> {
        validate_stream_name(&config.name)?;

        if let Some(invalid) = config.subjects.iter().find(|s| !subject::is_valid(s)) {
            return Err(Error::InvalidSubject(invalid.clone()));
        }

        let mut state = self.open().await?;

        for (name, stream) in &state.streams {
            if *name == config.name {
                continue;
            }

            if let Some(taken) = config
                .subjects
                .iter()
                .find(|s| stream.config().subjects.contains(*s))
            {
                return Err(Error::SubjectOverlap {
                    subject: taken.clone(),
                    stream: name.clone(),
                });
            }
        }

        if let Some(stream) = state.streams.get_mut(&config.name) {
            debug!(stream = %config.name, subjects = ?config.subjects, "updating stream");
            stream.reconfigure(config);

            return Ok(stream.info());
        }

        info!(stream = %config.name, subjects = ?config.subjects, "creating stream");
        let stream = MemoryStream::new(config);
        let info = stream.info();
        state.streams.insert(info.name.clone(), stream);

        Ok(info)
    }

    async fn delete_stream(&self, name: &str) -> Result<(), Error> {
        let mut state = self.open().await?;

        if state.streams.remove(name).is_some() {
            info!(stream = name, "deleted stream");
        }

        Ok(())
    }

    async fn purge_stream(&self, name: &str) -> Result<(), Error> {
        let mut state = self.open().await?;

        state
            .streams
            .get_mut(name)
            .ok_or_else(|| Error::StreamNotFound(name.to_string()))?
            .purge();

        Ok(())
    }

    async fn stream_info(&self, name: &str) -> Result<StreamInfo, Error> {
        let state = self.open().await?;

        state
            .streams
            .get(name)
            .map(MemoryStream::info)
            .ok_or_else(|| Error::StreamNotFound(name.to_string()))
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PubAck, Error> {
        if !subject::is_valid(subject) || subject::is_wildcard(subject) {
            return Err(Error::InvalidSubject(subject.to_string()));
        }

        let mut state = self.open().await?;
        let stream = state.stream_for(subject)?;
        let sequence = stream.append(subject, payload);

        Ok(PubAck {
            stream: stream.name().to_string(),
            sequence,
        })
    }

    async fn subscribe<H>(
        &self,
        subject: &str,
        replay: Replay,
        handler: H,
    ) -> Result<MemorySubscription, Error>
    where
        H: DeliveryHandler,
    {
        if !subject::is_valid(subject) {
            return Err(Error::InvalidSubject(subject.to_string()));
        }

        let mut state = self.open().await?;
        state.next_consumer += 1;
        let id = state.next_consumer;

        let stream = state.stream_for(subject)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop_sender, stop_receiver) = watch::channel(());

        if replay == Replay::LastOnly {
            if let Some(last) = stream.last_on(subject) {
                // The receiver is still in hand, so this cannot fail.
                let _ = sender.send(last);
            }
        }

        stream.add_consumer(id, Consumer::new(subject.to_string(), sender, stop_sender))?;
        let stream_name = stream.name().to_string();
        drop(state);

        subscription::spawn(subject.to_string(), receiver, stop_receiver, handler);
        debug!(subject, stream = %stream_name, ?replay, "subscribed");

        Ok(MemorySubscription::new(id, stream_name, subject.to_string()))
    }

    async fn unsubscribe(&self, subscription: MemorySubscription) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if let Some(stream) = state.streams.get_mut(subscription.stream()) {
            if stream.remove_consumer(subscription.id()) {
                debug!(stream = %subscription.stream(), "unsubscribed");
            }
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        self.open().await.map(|_| ())
    }

    async fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.closed = true;

        for stream in state.streams.values_mut() {
            stream.clear_consumers();
        }

        info!("memory transport closed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use neuron_messaging::transport::{ConsumerLimit, Delivery, TransportError};
    use tokio::time::timeout;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Clone, Debug)]
    struct Forward(mpsc::UnboundedSender<Delivery>);

    #[async_trait]
    impl DeliveryHandler for Forward {
        async fn deliver(&self, delivery: Delivery) {
            let _ = self.0.send(delivery);
        }
    }

    fn forward() -> (Forward, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Forward(sender), receiver)
    }

    async fn stream(transport: &MemoryTransport, name: &str, limit: ConsumerLimit) {
        transport
            .ensure_stream(StreamConfig::new(name, [name], limit))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_stream_fails() {
        let transport = MemoryTransport::new();

        let result = transport.publish("foo", Bytes::from_static(b"x")).await;

        assert_eq!(result, Err(Error::NoStreamForSubject("foo".to_string())));
    }

    #[tokio::test]
    async fn test_sequences_increase_per_stream() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;

        for expected in 1..=3 {
            let ack = transport
                .publish("foo", Bytes::from_static(b"x"))
                .await
                .unwrap();
            assert_eq!(ack.sequence, expected);
            assert_eq!(ack.stream, "foo");
        }

        let info = transport.stream_info("foo").await.unwrap();
        assert_eq!(info.messages, 3);
        assert_eq!(info.first_sequence, 1);
        assert_eq!(info.last_sequence, 3);
    }

    #[tokio::test]
    async fn test_tail_subscriber_sees_only_new_messages() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;
        transport.publish("foo", Bytes::from_static(b"old")).await.unwrap();

        let (handler, mut receiver) = forward();
        transport
            .subscribe("foo", Replay::Tail, handler)
            .await
            .unwrap();
        transport.publish("foo", Bytes::from_static(b"new")).await.unwrap();

        let delivery = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, Bytes::from_static(b"new"));
        assert_eq!(delivery.sequence, 2);
    }

    #[tokio::test]
    async fn test_last_only_subscriber_starts_with_latest() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;
        transport.publish("foo", Bytes::from_static(b"1")).await.unwrap();
        transport.publish("foo", Bytes::from_static(b"2")).await.unwrap();

        let (handler, mut receiver) = forward();
        transport
            .subscribe("foo", Replay::LastOnly, handler)
            .await
            .unwrap();

        let delivery = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, Bytes::from_static(b"2"));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_single_consumer_limit_is_enforced_until_unsubscribed() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Single).await;

        let (first, _first_receiver) = forward();
        let subscription = transport
            .subscribe("foo", Replay::Tail, first)
            .await
            .unwrap();

        let (second, _second_receiver) = forward();
        let error = transport
            .subscribe("foo", Replay::Tail, second.clone())
            .await
            .unwrap_err();
        assert!(error.is_consumer_limit_exceeded());

        transport.unsubscribe(subscription).await.unwrap();
        transport
            .subscribe("foo", Replay::Tail, second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_subjects_are_rejected() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;

        let result = transport
            .ensure_stream(StreamConfig::new("bar", ["foo"], ConsumerLimit::Unbounded))
            .await;

        assert!(matches!(result, Err(Error::SubjectOverlap { .. })));
    }

    #[tokio::test]
    async fn test_dotted_stream_names_are_rejected() {
        let transport = MemoryTransport::new();

        let result = transport
            .ensure_stream(StreamConfig::new("foo.bar", ["foo.bar"], ConsumerLimit::Unbounded))
            .await;

        assert_eq!(result, Err(Error::InvalidStreamName("foo.bar".to_string())));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_deleting_a_stream_ends_its_subscriptions() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;

        let (handler, mut receiver) = forward();
        transport
            .subscribe("foo", Replay::Tail, handler)
            .await
            .unwrap();

        transport.delete_stream("foo").await.unwrap();

        let ended = timeout(Duration::from_secs(1), receiver.recv()).await.unwrap();
        assert!(ended.is_none());
        assert!(transport.stream_info("foo").await.unwrap_err().is_not_found());
        assert!(logs_contain("deleted stream"));
    }

    #[tokio::test]
    async fn test_missing_stream_delete_succeeds_and_purge_is_not_found() {
        let transport = MemoryTransport::new();

        transport.delete_stream("nope").await.unwrap();
        assert!(transport.purge_stream("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_purge_keeps_sequence_numbering() {
        let transport = MemoryTransport::new();
        stream(&transport, "foo", ConsumerLimit::Unbounded).await;
        transport.publish("foo", Bytes::from_static(b"1")).await.unwrap();

        transport.purge_stream("foo").await.unwrap();
        let ack = transport.publish("foo", Bytes::from_static(b"2")).await.unwrap();

        assert_eq!(ack.sequence, 2);
        assert_eq!(transport.stream_info("foo").await.unwrap().messages, 1);
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_work() {
        let transport = MemoryTransport::new();
        transport.close().await.unwrap();

        assert_eq!(transport.flush().await, Err(Error::Closed));
        assert_eq!(
            transport.publish("foo", Bytes::new()).await,
            Err(Error::Closed)
        );
    }
}
