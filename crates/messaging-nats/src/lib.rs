//! NATS JetStream implementation of the messaging log transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod subscription;

pub use error::Error;
pub use subscription::NatsSubscription;

use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, push};
use async_nats::jetstream::stream::{Config as NatsStreamConfig, Info};
use async_nats::jetstream::{self, Context};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use neuron_messaging::transport::{
    ConsumerLimit, DeliveryHandler, LogTransport, PubAck, Replay, StreamConfig, StreamInfo,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Connection settings for [`NatsTransport::connect`].
#[derive(Clone, Debug)]
pub struct NatsTransportOptions {
    /// Server address, e.g. `localhost:4222`.
    pub url: String,

    /// How long to wait for the initial connection.
    pub connection_timeout: Duration,

    /// Client name reported to the server.
    pub name: Option<String>,
}

impl NatsTransportOptions {
    /// Options for the given server with a five second connection timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout: Duration::from_secs(5),
            name: None,
        }
    }
}

/// A log transport backed by NATS JetStream streams and push consumers.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    client: Client,
    jetstream: Context,
}

impl NatsTransport {
    /// Connects to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the server cannot be reached in time.
    pub async fn connect(options: NatsTransportOptions) -> Result<Self, Error> {
        let mut connect_options =
            ConnectOptions::default().connection_timeout(options.connection_timeout);

        if let Some(name) = &options.name {
            connect_options = connect_options.name(name.as_str());
        }

        let client = connect_options
            .connect(options.url.as_str())
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        info!(url = %options.url, "connected to nats");

        Ok(Self::with_client(client))
    }

    /// Wraps an existing client connection.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());

        Self { client, jetstream }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

fn to_nats_config(config: &StreamConfig) -> NatsStreamConfig {
    let max_consumers = config
        .consumer_limit
        .max_consumers()
        .map_or(-1, |max| i32::try_from(max).unwrap_or(i32::MAX));

    NatsStreamConfig {
        name: config.name.clone(),
        subjects: config.subjects.iter().cloned().collect(),
        max_consumers,
        ..Default::default()
    }
}

fn to_stream_info(info: &Info) -> StreamInfo {
    let consumer_limit = if info.config.max_consumers == 1 {
        ConsumerLimit::Single
    } else {
        ConsumerLimit::Unbounded
    };

    StreamInfo {
        name: info.config.name.clone(),
        subjects: info.config.subjects.iter().cloned().collect(),
        consumer_limit,
        messages: info.state.messages,
        first_sequence: info.state.first_sequence,
        last_sequence: info.state.last_sequence,
        consumers: info.state.consumer_count,
    }
}

#[async_trait]
impl LogTransport for NatsTransport {
    type Error = Error;
    type Subscription = NatsSubscription;

    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Error> {
        let nats_config = to_nats_config(&config);

        match self.jetstream.get_stream(&config.name).await {
            Ok(_) => {
                debug!(stream = %config.name, subjects = ?config.subjects, "updating stream");

                let info = self
                    .jetstream
                    .update_stream(nats_config)
                    .await
                    .map_err(|e| Error::StreamCreate(e.kind()))?;

                return Ok(to_stream_info(&info));
            }
            Err(e) => match Error::stream_get(&config.name, e.kind()) {
                Error::StreamNotFound(_) => {}
                error => return Err(error),
            },
        }

        info!(stream = %config.name, subjects = ?config.subjects, "creating stream");

        let stream = self
            .jetstream
            .create_stream(nats_config)
            .await
            .map_err(|e| Error::StreamCreate(e.kind()))?;

        Ok(to_stream_info(stream.cached_info()))
    }

    async fn delete_stream(&self, name: &str) -> Result<(), Error> {
        match self.jetstream.delete_stream(name).await {
            Ok(_) => {
                info!(stream = name, "deleted stream");
                Ok(())
            }
            Err(e) => match Error::stream_delete(name, e.kind()) {
                Error::StreamNotFound(_) => Ok(()),
                error => Err(error),
            },
        }
    }

    async fn purge_stream(&self, name: &str) -> Result<(), Error> {
        let stream = self
            .jetstream
            .get_stream(name)
            .await
            .map_err(|e| Error::stream_get(name, e.kind()))?;

        stream
            .purge()
            .await
            .map_err(|e| Error::stream_purge(name, e.kind()))?;

        debug!(stream = name, "purged stream");

        Ok(())
    }

    async fn stream_info(&self, name: &str) -> Result<StreamInfo, Error> {
        let stream = self
            .jetstream
            .get_stream(name)
            .await
            .map_err(|e| Error::stream_get(name, e.kind()))?;

        Ok(to_stream_info(stream.cached_info()))
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PubAck, Error> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))?
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        Ok(PubAck {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }

    async fn subscribe<H>(
        &self,
        subject: &str,
        replay: Replay,
        handler: H,
    ) -> Result<NatsSubscription, Error>
    where
        H: DeliveryHandler,
    {
        let stream_name = self
            .jetstream
            .stream_by_subject(subject)
            .await
            .map_err(|e| Error::StreamLookup(e.kind()))?;

        let stream = self
            .jetstream
            .get_stream(&stream_name)
            .await
            .map_err(|e| Error::stream_get(&stream_name, e.kind()))?;

        let deliver_policy = match replay {
            Replay::Tail => DeliverPolicy::New,
            Replay::LastOnly => DeliverPolicy::LastPerSubject,
        };

        let consumer = stream
            .create_consumer(push::Config {
                deliver_subject: self.client.new_inbox(),
                filter_subject: subject.to_string(),
                deliver_policy,
                ack_policy: AckPolicy::None,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::consumer_create(&stream_name, e.kind()))?;

        let consumer_name = consumer.cached_info().name.clone();

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Messages(e.kind()))?;

        let stop = CancellationToken::new();
        subscription::spawn(subject.to_string(), messages, stop.clone(), handler);

        debug!(subject, stream = %stream_name, consumer = %consumer_name, ?replay, "subscribed");

        Ok(NatsSubscription::new(
            subject.to_string(),
            consumer_name,
            stream,
            stop,
        ))
    }

    async fn unsubscribe(&self, subscription: NatsSubscription) -> Result<(), Error> {
        subscription.stop();

        match subscription
            .stream()
            .delete_consumer(subscription.consumer())
            .await
        {
            Ok(_) => {
                debug!(consumer = subscription.consumer(), "unsubscribed");
                Ok(())
            }
            Err(e) => {
                let kind = e.kind();

                if Error::is_gone(&kind) {
                    Ok(())
                } else {
                    Err(Error::ConsumerDelete(kind))
                }
            }
        }
    }

    async fn flush(&self) -> Result<(), Error> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Flush(e.kind()))
    }

    // The connection itself closes once the last clone of the client drops.
    async fn close(&self) -> Result<(), Error> {
        self.flush().await?;

        info!("nats transport closed");

        Ok(())
    }
}
