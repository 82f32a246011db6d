use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::{Integrity, Mode};

/// Default subject prefix for synthesized response subjects.
pub const RESPONSE_PREFIX: &str = "StreamResponsePrefix.";

/// Per-call publish/subscribe configuration.
///
/// `mode` and `integrity` stay in their textual form so that unknown values
/// survive deserialization and are rejected when the call is made.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PubSubConfig {
    /// Subject, also used as the stream name.
    pub topic: String,

    /// `broadcast` or `peer-to-peer`; empty means broadcast.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// `exactly-once` or `at-least-once`; empty means at-least-once.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub integrity: String,

    /// Delete the topic's stream before publishing.
    #[serde(default, rename = "delete-previous")]
    pub delete_previous: bool,
}

impl PubSubConfig {
    /// A config for the topic with default semantics.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode.as_str().to_string();
        self
    }

    /// Sets the integrity.
    #[must_use]
    pub fn with_integrity(mut self, integrity: Integrity) -> Self {
        self.integrity = integrity.as_str().to_string();
        self
    }

    /// Sets delete-previous.
    #[must_use]
    pub const fn with_delete_previous(mut self, delete_previous: bool) -> Self {
        self.delete_previous = delete_previous;
        self
    }
}

/// Options for a [`Controller`](crate::controller::Controller).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Interval between attempts to subscribe to a response subject.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Prefix of synthesized response subjects.
    pub response_prefix: String,

    /// Capacity of each subscription's error channel.
    pub error_buffer: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            response_prefix: RESPONSE_PREFIX.to_string(),
            error_buffer: 64,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_uses_hyphenated_delete_previous() {
        let config = PubSubConfig::new("foo")
            .with_mode(Mode::PeerToPeer)
            .with_integrity(Integrity::ExactlyOnce)
            .with_delete_previous(true);

        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "topic": "foo",
                "mode": "peer-to-peer",
                "integrity": "exactly-once",
                "delete-previous": true,
            })
        );
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let config: PubSubConfig = serde_json::from_str(r#"{"topic":"foo"}"#).unwrap();

        assert_eq!(config, PubSubConfig::new("foo"));
    }

    #[test]
    fn test_unknown_mode_survives_deserialization() {
        let config: PubSubConfig =
            serde_json::from_str(r#"{"topic":"foo","mode":"multicast"}"#).unwrap();

        assert_eq!(config.mode, "multicast");
    }

    #[test]
    fn test_controller_options_read_millis() {
        let options: ControllerOptions =
            serde_json::from_str(r#"{"poll_interval_ms":10}"#).unwrap();

        assert_eq!(options.poll_interval, Duration::from_millis(10));
        assert_eq!(options.response_prefix, RESPONSE_PREFIX);
    }
}
