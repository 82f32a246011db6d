use std::collections::HashMap;

use bytes::Bytes;
use neuron_messaging::transport::{Delivery, StreamConfig, StreamInfo};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::Error;
use crate::subject;

#[derive(Clone, Debug)]
struct StoredMessage {
    sequence: u64,
    subject: String,
    payload: Bytes,
}

impl StoredMessage {
    fn to_delivery(&self) -> Delivery {
        Delivery {
            subject: self.subject.clone(),
            reply: None,
            payload: self.payload.clone(),
            sequence: self.sequence,
        }
    }
}

/// A registered push consumer.
#[derive(Debug)]
pub struct Consumer {
    filter: String,
    sender: mpsc::UnboundedSender<Delivery>,
    // Dropping this ends the consumer's task.
    _stop: watch::Sender<()>,
}

impl Consumer {
    pub const fn new(
        filter: String,
        sender: mpsc::UnboundedSender<Delivery>,
        stop: watch::Sender<()>,
    ) -> Self {
        Self {
            filter,
            sender,
            _stop: stop,
        }
    }
}

/// An append-only stream held in memory.
#[derive(Debug)]
pub struct MemoryStream {
    config: StreamConfig,
    messages: Vec<StoredMessage>,
    last_sequence: u64,
    consumers: HashMap<u64, Consumer>,
}

impl MemoryStream {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            messages: Vec::new(),
            last_sequence: 0,
            consumers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Whether any of the stream's subjects covers the subject.
    pub fn binds(&self, subject: &str) -> bool {
        self.config
            .subjects
            .iter()
            .any(|bound| subject::matches(bound, subject))
    }

    pub fn reconfigure(&mut self, config: StreamConfig) {
        self.config = config;
    }

    /// Stores a message and fans it out to matching consumers.
    pub fn append(&mut self, subject: &str, payload: Bytes) -> u64 {
        self.last_sequence += 1;

        let message = StoredMessage {
            sequence: self.last_sequence,
            subject: subject.to_string(),
            payload,
        };

        self.consumers
            .retain(|_, consumer| !consumer.sender.is_closed());

        for consumer in self.consumers.values() {
            if subject::matches(&consumer.filter, subject) {
                // A closed receiver only means the consumer task just ended.
                let _ = consumer.sender.send(message.to_delivery());
            }
        }

        self.messages.push(message);

        self.last_sequence
    }

    /// The newest stored message matching the filter.
    pub fn last_on(&self, filter: &str) -> Option<Delivery> {
        self.messages
            .iter()
            .rev()
            .find(|message| subject::matches(filter, &message.subject))
            .map(StoredMessage::to_delivery)
    }

    /// Registers a consumer if the consumer limit allows it.
    pub fn add_consumer(&mut self, id: u64, consumer: Consumer) -> Result<(), Error> {
        self.consumers
            .retain(|_, consumer| !consumer.sender.is_closed());

        if !self.config.consumer_limit.admits(self.consumers.len()) {
            return Err(Error::MaximumConsumers(self.config.name.clone()));
        }

        self.consumers.insert(id, consumer);

        Ok(())
    }

    pub fn remove_consumer(&mut self, id: u64) -> bool {
        self.consumers.remove(&id).is_some()
    }

    pub fn clear_consumers(&mut self) {
        self.consumers.clear();
    }

    pub fn purge(&mut self) {
        debug!(stream = %self.config.name, purged = self.messages.len(), "purging stream");
        self.messages.clear();
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.config.name.clone(),
            subjects: self.config.subjects.clone(),
            consumer_limit: self.config.consumer_limit,
            messages: self.messages.len() as u64,
            first_sequence: self
                .messages
                .first()
                .map_or(self.last_sequence + 1, |message| message.sequence),
            last_sequence: self.last_sequence,
            consumers: self.consumers.len(),
        }
    }
}
