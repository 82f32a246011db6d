use std::str::Utf8Error;

use thiserror::Error;

/// Error type for payload encoding and decoding.
#[derive(Debug, Error)]
pub enum Error {
    /// Payload is not valid JSON for the destination type.
    #[error("failed to decode payload: {0}")]
    DecodeJson(#[source] serde_json::Error),

    /// Payload is not UTF-8 but the destination is text.
    #[error("failed to decode payload as text: {0}")]
    DecodeText(#[from] Utf8Error),

    /// Value could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    /// Whether this is a decode failure.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::DecodeJson(_) | Self::DecodeText(_))
    }
}
