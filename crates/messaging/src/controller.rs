use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec::{Decode, Encode};
use crate::config::{ControllerOptions, PubSubConfig};
use crate::delivery::{Integrity, Mode};
use crate::dispatch::{Dispatcher, Target, error_channel};
use crate::error::Error;
use crate::request::{PendingRequest, RequestHandler, Requester, Responder};
use crate::stream_manager::StreamManager;
use crate::subscription::Subscription;
use crate::transport::{LogTransport, PubAck, TransportError, TransportSubscription};

/// Typed publish/subscribe and request/response over a log transport.
#[derive(Clone, Debug)]
pub struct Controller<T>
where
    T: LogTransport,
{
    transport: T,
    streams: StreamManager<T>,
    requester: Requester<T>,
    responder: Responder<T>,
    options: ControllerOptions,
}

impl<T> Controller<T>
where
    T: LogTransport,
{
    /// Creates a new controller on top of a transport.
    pub fn new(transport: T, options: ControllerOptions) -> Self {
        Self {
            streams: StreamManager::new(transport.clone()),
            requester: Requester::new(transport.clone(), options.clone()),
            responder: Responder::new(transport.clone(), options.clone()),
            transport,
            options,
        }
    }

    /// Publishes a value on the config's topic.
    ///
    /// The topic's stream is created on first use with the consumer limit
    /// the mode asks for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] for an empty topic,
    /// [`Error::IllegalMode`] or [`Error::IllegalIntegrity`] for unknown
    /// semantics, [`Error::Codec`] if the value cannot be encoded, and
    /// [`Error::Transport`] if the transport rejects a step.
    pub async fn publish<P>(&self, payload: &P, config: &PubSubConfig) -> Result<PubAck, Error<T::Error>>
    where
        P: Encode + Sync + ?Sized,
    {
        let topic = validated_topic(config)?;

        if config.delete_previous && self.streams.exists(topic).await? {
            self.streams.delete_stream(topic).await?;
            info!(topic, "deleted previous stream");
        }

        let mode = Mode::resolve(&config.mode)?;
        Integrity::resolve(&config.integrity)?;

        self.streams
            .ensure_stream(topic, [topic], mode.consumer_limit())
            .await?;

        let ack = self
            .transport
            .publish(topic, payload.encode()?)
            .await
            .map_err(Error::Transport)?;

        debug!(topic, stream = %ack.stream, sequence = ack.sequence, "published");

        Ok(ack)
    }

    /// Subscribes to the config's topic, decoding each message into `V`.
    ///
    /// The target is a [`Slot`](crate::dispatch::Slot) or exactly one
    /// [`Handler`](crate::dispatch::Handler).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] for an empty topic,
    /// [`Error::InvalidHandler`] for a bad target,
    /// [`Error::IllegalIntegrity`] for unknown integrity,
    /// [`Error::ConsumerLimitExceeded`] if a peer-to-peer topic already has
    /// its consumer, and [`Error::Transport`] otherwise.
    pub async fn subscribe<V>(
        &self,
        config: &PubSubConfig,
        target: impl Into<Target<V>> + Send,
    ) -> Result<Subscription<T::Subscription>, Error<T::Error>>
    where
        V: Decode + Send + Sync + 'static,
    {
        let topic = validated_topic(config)?;

        let (errors, receiver) = error_channel(self.options.error_buffer);
        let dispatcher = Dispatcher::new(target.into(), errors)?;
        let replay = Integrity::resolve(&config.integrity)?.replay();

        let handle = self
            .transport
            .subscribe(topic, replay, dispatcher)
            .await
            .map_err(|e| Error::from_subscribe(e, topic))?;

        info!(topic, ?replay, "subscribed");

        Ok(Subscription::new(handle, receiver))
    }

    /// Stops a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails to release it.
    pub async fn unsubscribe(
        &self,
        subscription: Subscription<T::Subscription>,
    ) -> Result<(), Error<T::Error>> {
        let handle = subscription.into_handle();
        let subject = handle.subject().to_string();

        self.transport
            .unsubscribe(handle)
            .await
            .map_err(Error::Transport)?;

        info!(subject, "unsubscribed");

        Ok(())
    }

    /// Sends a typed request and decodes the reply.
    ///
    /// # Errors
    ///
    /// As [`Requester::request`], plus [`Error::Codec`] for either payload.
    pub async fn request<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, Error<T::Error>>
    where
        Req: Encode + Sync + ?Sized,
        Resp: Decode,
    {
        self.request_with_cancel(subject, request, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`Self::request`], but also gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Requester::request_with_cancel`], plus [`Error::Codec`].
    pub async fn request_with_cancel<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Resp, Error<T::Error>>
    where
        Req: Encode + Sync + ?Sized,
        Resp: Decode,
    {
        let reply = self
            .requester
            .request_with_cancel(subject, request.encode()?, timeout, cancel)
            .await?;

        Ok(Resp::decode(reply)?)
    }

    /// Waits for one request, answers it, and returns the decoded request.
    ///
    /// # Errors
    ///
    /// As [`Responder::respond`], plus [`Error::Codec`] for either payload.
    pub async fn respond<Req, Resp>(
        &self,
        subject: &str,
        reply: &Resp,
        timeout: Duration,
    ) -> Result<Req, Error<T::Error>>
    where
        Req: Decode,
        Resp: Encode + Sync + ?Sized,
    {
        let request = self
            .responder
            .respond(subject, reply.encode()?, timeout)
            .await?;

        Ok(Req::decode(request)?)
    }

    /// Starts listening for a request; see [`Responder::listen`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the subscription cannot be created.
    pub async fn listen(&self, subject: &str) -> Result<PendingRequest<T>, Error<T::Error>> {
        self.responder.listen(subject).await
    }

    /// Answers every request on the subject; see [`Responder::serve`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the subscription cannot be created.
    pub async fn serve<H>(
        &self,
        subject: &str,
        handler: H,
    ) -> Result<Subscription<T::Subscription>, Error<T::Error>>
    where
        H: RequestHandler,
    {
        self.responder.serve(subject, handler).await
    }

    /// Drains outstanding publishes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails to flush.
    pub async fn flush(&self) -> Result<(), Error<T::Error>> {
        self.transport.flush().await.map_err(Error::Transport)
    }

    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails to close.
    pub async fn close(&self) -> Result<(), Error<T::Error>> {
        self.transport.close().await.map_err(Error::Transport)?;
        info!("controller closed");

        Ok(())
    }

    /// Stream administration.
    #[must_use]
    pub const fn streams(&self) -> &StreamManager<T> {
        &self.streams
    }

    /// The request side of request/response.
    #[must_use]
    pub const fn requester(&self) -> &Requester<T> {
        &self.requester
    }

    /// The reply side of request/response.
    #[must_use]
    pub const fn responder(&self) -> &Responder<T> {
        &self.responder
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

fn validated_topic<TE>(config: &PubSubConfig) -> Result<&str, Error<TE>>
where
    TE: TransportError,
{
    if config.topic.is_empty() {
        return Err(Error::MissingConfig);
    }

    Ok(&config.topic)
}
