use tracing::{debug, info};

use crate::error::Error;
use crate::transport::{ConsumerLimit, LogTransport, StreamConfig, StreamInfo, TransportError};

/// Creates, extends and tears down streams on a transport.
#[derive(Clone, Debug)]
pub struct StreamManager<T>
where
    T: LogTransport,
{
    transport: T,
}

impl<T> StreamManager<T>
where
    T: LogTransport,
{
    /// Creates a new stream manager.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Makes sure the stream exists with at least these subjects and exactly
    /// this consumer limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport rejects the stream.
    pub async fn ensure_stream<I, S>(
        &self,
        name: &str,
        subjects: I,
        consumer_limit: ConsumerLimit,
    ) -> Result<StreamInfo, Error<T::Error>>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        let requested = StreamConfig::new(name, subjects, consumer_limit);

        match self.transport.stream_info(name).await {
            Ok(existing) => self.reconcile(requested, &existing).await,
            Err(e) if e.is_not_found() => self.create(requested).await,
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Adds subjects to a stream, keeping its consumer limit.
    ///
    /// Creates an unbounded stream if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport rejects the update.
    pub async fn extend_subjects<I, S>(
        &self,
        name: &str,
        subjects: I,
    ) -> Result<StreamInfo, Error<T::Error>>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        let subjects: Vec<String> = subjects.into_iter().map(Into::into).collect();

        match self.transport.stream_info(name).await {
            Ok(existing) => {
                let requested = StreamConfig::new(name, subjects, existing.consumer_limit);
                self.reconcile(requested, &existing).await
            }
            Err(e) if e.is_not_found() => {
                self.create(StreamConfig::new(name, subjects, ConsumerLimit::Unbounded))
                    .await
            }
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Deletes a stream. A missing stream is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails otherwise.
    pub async fn delete_stream(&self, name: &str) -> Result<(), Error<T::Error>> {
        match self.transport.delete_stream(name).await {
            Ok(()) => {
                info!(stream = name, "deleted stream");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Drops all messages of a stream. A missing stream is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails otherwise.
    pub async fn purge_stream(&self, name: &str) -> Result<(), Error<T::Error>> {
        match self.transport.purge_stream(name).await {
            Ok(()) => {
                info!(stream = name, "purged stream");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Reports stream metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`], classified as not-found for a missing
    /// stream.
    pub async fn stream_info(&self, name: &str) -> Result<StreamInfo, Error<T::Error>> {
        self.transport.stream_info(name).await.map_err(Error::Transport)
    }

    /// Whether the stream exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] for failures other than not-found.
    pub async fn exists(&self, name: &str) -> Result<bool, Error<T::Error>> {
        match self.transport.stream_info(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(Error::Transport(e)),
        }
    }

    async fn reconcile(
        &self,
        requested: StreamConfig,
        existing: &StreamInfo,
    ) -> Result<StreamInfo, Error<T::Error>> {
        if requested.is_satisfied_by(existing) {
            debug!(stream = %requested.name, "stream already satisfies config");
            return Ok(existing.clone());
        }

        let merged = requested.merged_with(existing);
        debug!(stream = %merged.name, subjects = ?merged.subjects, limit = ?merged.consumer_limit, "updating stream");

        self.transport
            .ensure_stream(merged)
            .await
            .map_err(Error::Transport)
    }

    async fn create(&self, config: StreamConfig) -> Result<StreamInfo, Error<T::Error>> {
        info!(stream = %config.name, subjects = ?config.subjects, limit = ?config.consumer_limit, "creating stream");

        self.transport
            .ensure_stream(config)
            .await
            .map_err(Error::Transport)
    }
}
