mod envelope;

pub use envelope::{Envelope, response_filter, response_subject};

use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerOptions;
use crate::dispatch::{DispatchError, ErrorReporter, error_channel};
use crate::error::Error;
use crate::stream_manager::StreamManager;
use crate::subscription::Subscription;
use crate::transport::{
    Delivery, DeliveryHandler, LogTransport, Replay, TransportError,
};

/// Answers requests for [`Responder::serve`].
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// The error type for the handler.
    type Error: StdError + Send + Sync + 'static;

    /// Produces the reply for one request payload.
    async fn handle(&self, subject: &str, request: Bytes) -> Result<Bytes, Self::Error>;
}

/// Sends requests over plain pub/sub and waits for the matching reply.
#[derive(Clone, Debug)]
pub struct Requester<T>
where
    T: LogTransport,
{
    transport: T,
    streams: StreamManager<T>,
    options: ControllerOptions,
}

struct Exchange<'a> {
    subject: &'a str,
    response_subject: String,
    deadline: Instant,
    timeout: Duration,
    cancel: &'a CancellationToken,
}

impl<T> Requester<T>
where
    T: LogTransport,
{
    /// Creates a new requester.
    pub fn new(transport: T, options: ControllerOptions) -> Self {
        Self {
            streams: StreamManager::new(transport.clone()),
            transport,
            options,
        }
    }

    /// Sends a request and waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no reply arrives in time, or the error of
    /// whichever step of the exchange failed.
    pub async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, Error<T::Error>> {
        self.request_with_cancel(subject, payload, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`Self::request`], but also gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, otherwise as
    /// [`Self::request`].
    pub async fn request_with_cancel(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Bytes, Error<T::Error>> {
        let exchange = Exchange {
            subject,
            response_subject: response_subject(&self.options.response_prefix, subject),
            deadline: Instant::now() + timeout,
            timeout,
            cancel,
        };
        debug!(subject, response_subject = %exchange.response_subject, "sending request");

        let filter = response_filter(&self.options.response_prefix, subject);
        self.streams
            .extend_subjects(subject, [subject, filter.as_str()])
            .await?;

        let (sender, receiver) = oneshot::channel();
        let subscription = self.arm(&exchange, FirstDelivery::new(sender)).await?;

        let outcome = self.exchange(&exchange, payload, receiver).await;
        let released = self.transport.unsubscribe(subscription).await;

        match (outcome, released) {
            (Ok(reply), Ok(())) => {
                debug!(subject, "received reply");
                Ok(reply)
            }
            (Ok(_), Err(e)) => Err(Error::Transport(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release)) => {
                warn!(subject, error = %release, "failed to release response subscription");
                Err(e)
            }
        }
    }

    async fn arm(
        &self,
        exchange: &Exchange<'_>,
        handler: FirstDelivery,
    ) -> Result<T::Subscription, Error<T::Error>> {
        loop {
            match self
                .transport
                .subscribe(&exchange.response_subject, Replay::LastOnly, handler.clone())
                .await
            {
                Ok(subscription) => return Ok(subscription),
                Err(e) if e.is_consumer_limit_exceeded() => {
                    return Err(Error::from_subscribe(e, &exchange.response_subject));
                }
                Err(e) if Instant::now() + self.options.poll_interval >= exchange.deadline => {
                    return Err(Error::Transport(e));
                }
                Err(e) => debug!(error = %e, "response subject not ready, retrying"),
            }

            tokio::select! {
                () = exchange.cancel.cancelled() => {
                    return Err(Error::Cancelled(exchange.subject.to_string()));
                }
                () = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
    }

    async fn exchange(
        &self,
        exchange: &Exchange<'_>,
        payload: Bytes,
        receiver: oneshot::Receiver<Bytes>,
    ) -> Result<Bytes, Error<T::Error>> {
        let envelope = Envelope::new(exchange.response_subject.clone(), payload).to_bytes()?;

        self.transport
            .publish(exchange.subject, envelope)
            .await
            .map_err(Error::Transport)?;

        tokio::select! {
            () = exchange.cancel.cancelled() => Err(Error::Cancelled(exchange.subject.to_string())),
            reply = tokio::time::timeout_at(exchange.deadline, receiver) => match reply {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(Error::SubscriptionClosed(exchange.response_subject.clone())),
                Err(_) => Err(Error::Timeout {
                    subject: exchange.subject.to_string(),
                    timeout: exchange.timeout,
                }),
            },
        }
    }
}

/// Receives requests sent by a [`Requester`] and replies to them.
#[derive(Clone, Debug)]
pub struct Responder<T>
where
    T: LogTransport,
{
    transport: T,
    streams: StreamManager<T>,
    options: ControllerOptions,
}

impl<T> Responder<T>
where
    T: LogTransport,
{
    /// Creates a new responder.
    pub fn new(transport: T, options: ControllerOptions) -> Self {
        Self {
            streams: StreamManager::new(transport.clone()),
            transport,
            options,
        }
    }

    /// Starts listening for the next request on the subject.
    ///
    /// The subject's stream is created if needed. Only requests published
    /// after this call are seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the stream or subscription cannot be
    /// created.
    pub async fn listen(&self, subject: &str) -> Result<PendingRequest<T>, Error<T::Error>> {
        self.streams.extend_subjects(subject, [subject]).await?;

        let (sender, receiver) = oneshot::channel();
        let subscription = self
            .transport
            .subscribe(subject, Replay::Tail, FirstDelivery::new(sender))
            .await
            .map_err(|e| Error::from_subscribe(e, subject))?;

        debug!(subject, "listening for request");

        Ok(PendingRequest {
            transport: self.transport.clone(),
            subject: subject.to_string(),
            subscription: Some(subscription),
            receiver,
        })
    }

    /// Waits for one request, publishes the reply, and returns the request
    /// payload.
    ///
    /// # Errors
    ///
    /// As [`Self::listen`] and [`PendingRequest::reply`].
    pub async fn respond(
        &self,
        subject: &str,
        reply: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, Error<T::Error>> {
        self.listen(subject).await?.reply(reply, timeout).await
    }

    /// Answers every request on the subject until unsubscribed.
    ///
    /// Envelope, handler and publish failures go to the returned
    /// subscription's error channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the stream or subscription cannot be
    /// created.
    pub async fn serve<H>(
        &self,
        subject: &str,
        handler: H,
    ) -> Result<Subscription<T::Subscription>, Error<T::Error>>
    where
        H: RequestHandler,
    {
        self.streams.extend_subjects(subject, [subject]).await?;

        let (errors, receiver) = error_channel(self.options.error_buffer);
        let server = Server {
            transport: self.transport.clone(),
            handler,
            errors,
        };

        let subscription = self
            .transport
            .subscribe(subject, Replay::Tail, server)
            .await
            .map_err(|e| Error::from_subscribe(e, subject))?;

        info!(subject, "serving requests");

        Ok(Subscription::new(subscription, receiver))
    }
}

/// A request listener armed by [`Responder::listen`].
///
/// Dropping it without replying releases the subscription in the background.
pub struct PendingRequest<T>
where
    T: LogTransport,
{
    transport: T,
    subject: String,
    subscription: Option<T::Subscription>,
    receiver: oneshot::Receiver<Bytes>,
}

impl<T> PendingRequest<T>
where
    T: LogTransport,
{
    /// The subject being listened on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits up to `timeout` for a request, answers it, and returns the
    /// request payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time,
    /// [`Error::Codec`] for a malformed envelope, or [`Error::Transport`] if
    /// the reply cannot be published.
    pub async fn reply(self, reply: Bytes, timeout: Duration) -> Result<Bytes, Error<T::Error>> {
        self.reply_with_cancel(reply, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`Self::reply`], but also gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, otherwise as
    /// [`Self::reply`].
    pub async fn reply_with_cancel(
        mut self,
        reply: Bytes,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Bytes, Error<T::Error>> {
        let received = tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled(self.subject.clone())),
            request = tokio::time::timeout(timeout, &mut self.receiver) => match request {
                Ok(Ok(request)) => Ok(request),
                Ok(Err(_)) => Err(Error::SubscriptionClosed(self.subject.clone())),
                Err(_) => Err(Error::Timeout {
                    subject: self.subject.clone(),
                    timeout,
                }),
            },
        };

        let answered = match received {
            Ok(request) => self.answer(&request, reply).await,
            Err(e) => Err(e),
        };
        let released = self.release().await;

        match (answered, released) {
            (Ok(data), Ok(())) => Ok(data),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release)) => {
                warn!(subject = %self.subject, error = %release, "failed to release request listener");
                Err(e)
            }
        }
    }

    async fn answer(&self, request: &[u8], reply: Bytes) -> Result<Bytes, Error<T::Error>> {
        let envelope = Envelope::from_bytes(request)?;
        self.transport
            .publish(&envelope.response_subject, reply)
            .await
            .map_err(Error::Transport)?;

        debug!(subject = %self.subject, response_subject = %envelope.response_subject, "replied to request");

        Ok(envelope.data)
    }

    async fn release(&mut self) -> Result<(), Error<T::Error>> {
        match self.subscription.take() {
            Some(subscription) => self
                .transport
                .unsubscribe(subscription)
                .await
                .map_err(Error::Transport),
            None => Ok(()),
        }
    }
}

impl<T> Debug for PendingRequest<T>
where
    T: LogTransport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("subject", &self.subject)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for PendingRequest<T>
where
    T: LogTransport,
{
    fn drop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(subject = %self.subject, "no runtime to release request listener");
            return;
        };

        let transport = self.transport.clone();
        runtime.spawn(async move {
            if let Err(e) = transport.unsubscribe(subscription).await {
                warn!(error = %e, "failed to release request listener");
            }
        });
    }
}

/// Hands the payload of the first delivery to a oneshot and ignores the rest.
#[derive(Clone)]
struct FirstDelivery {
    sender: Arc<Mutex<Option<oneshot::Sender<Bytes>>>>,
}

impl FirstDelivery {
    fn new(sender: oneshot::Sender<Bytes>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }
}

#[async_trait]
impl DeliveryHandler for FirstDelivery {
    async fn deliver(&self, delivery: Delivery) {
        if let Some(sender) = self.sender.lock().await.take() {
            // The waiting side may already have given up.
            let _ = sender.send(delivery.payload);
        }
    }
}

struct Server<T, H>
where
    T: LogTransport,
{
    transport: T,
    handler: H,
    errors: ErrorReporter,
}

impl<T, H> Server<T, H>
where
    T: LogTransport,
    H: RequestHandler,
{
    async fn answer(&self, delivery: &Delivery) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let envelope = Envelope::from_bytes(&delivery.payload)?;
        let reply = self
            .handler
            .handle(&delivery.subject, envelope.data)
            .await?;

        self.transport
            .publish(&envelope.response_subject, reply)
            .await?;

        debug!(subject = %delivery.subject, response_subject = %envelope.response_subject, "served request");

        Ok(())
    }
}

#[async_trait]
impl<T, H> DeliveryHandler for Server<T, H>
where
    T: LogTransport,
    H: RequestHandler,
{
    async fn deliver(&self, delivery: Delivery) {
        if let Err(source) = self.answer(&delivery).await {
            warn!(subject = %delivery.subject, sequence = delivery.sequence, error = %source, "failed to serve request");

            let failure = DispatchError {
                subject: delivery.subject,
                sequence: delivery.sequence,
                source,
            };

            self.errors.report(failure);
        }
    }
}
