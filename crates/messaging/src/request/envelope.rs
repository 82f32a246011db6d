use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::CodecError;

/// Request payload wrapped with the subject its reply must go to.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Envelope {
    /// Subject the responder publishes its reply on.
    #[serde(rename = "respSubj")]
    pub response_subject: String,

    /// Request payload, base64 on the wire.
    #[serde(with = "base64_data")]
    pub data: Bytes,
}

impl Envelope {
    /// Wraps a payload.
    pub fn new(response_subject: impl Into<String>, data: Bytes) -> Self {
        Self {
            response_subject: response_subject.into(),
            data,
        }
    }

    /// Serializes the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    /// Parses an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DecodeJson`] if the payload is not an envelope.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::DecodeJson)
    }
}

/// A fresh response subject for a request on `request_subject`.
///
/// Timestamp plus random nonce in a single token, so concurrent requests
/// never share one and [`response_filter`] covers them all.
#[must_use]
pub fn response_subject(prefix: &str, request_subject: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let nonce = Uuid::new_v4().simple();

    format!("{}{nanos}-{nonce}.{request_subject}", scope(prefix))
}

/// The wildcard subject matching every response subject for
/// `request_subject`.
#[must_use]
pub fn response_filter(prefix: &str, request_subject: &str) -> String {
    format!("{}*.{request_subject}", scope(prefix))
}

// Prefixes always end on a token boundary.
fn scope(prefix: &str) -> Cow<'_, str> {
    if prefix.is_empty() || prefix.ends_with('.') {
        Cow::Borrowed(prefix)
    } else {
        Cow::Owned(format!("{prefix}."))
    }
}

mod base64_data {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    // `null` is how an empty payload appears on the wire.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(encoded) = Option::<String>::deserialize(deserializer)? else {
            return Ok(Bytes::new());
        };

        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
