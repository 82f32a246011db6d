mod error;

pub use error::Error as CodecError;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Types that can be turned into a message payload.
pub trait Encode {
    /// Encodes the value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be serialized.
    fn encode(&self) -> Result<Bytes, CodecError>;
}

/// Types that can be read back out of a message payload.
pub trait Decode: Sized {
    /// Decodes a payload.
    ///
    /// # Errors
    ///
    /// Returns a decode [`CodecError`] if the payload does not fit the type.
    fn decode(payload: Bytes) -> Result<Self, CodecError>;
}

/// Structured payload carried as JSON.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Encode for str {
    fn encode(&self) -> Result<Bytes, CodecError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }
}

impl Encode for String {
    fn encode(&self) -> Result<Bytes, CodecError> {
        self.as_str().encode()
    }
}

impl Encode for [u8] {
    fn encode(&self) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Result<Bytes, CodecError> {
        self.as_slice().encode()
    }
}

impl Encode for Bytes {
    fn encode(&self) -> Result<Bytes, CodecError> {
        Ok(self.clone())
    }
}

impl<T> Encode for Json<T>
where
    T: Serialize,
{
    fn encode(&self) -> Result<Bytes, CodecError> {
        serde_json::to_vec(&self.0)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }
}

impl<T> Encode for &T
where
    T: Encode + ?Sized,
{
    fn encode(&self) -> Result<Bytes, CodecError> {
        (**self).encode()
    }
}

impl Decode for String {
    fn decode(payload: Bytes) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(&payload)?;

        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            return Ok(serde_json::from_str::<Self>(text)
                .unwrap_or_else(|_| text[1..text.len() - 1].to_string()));
        }

        Ok(text.to_string())
    }
}

impl Decode for Bytes {
    fn decode(payload: Bytes) -> Result<Self, CodecError> {
        Ok(payload)
    }
}

impl Decode for Vec<u8> {
    fn decode(payload: Bytes) -> Result<Self, CodecError> {
        Ok(payload.to_vec())
    }
}

impl<T> Decode for Json<T>
where
    T: DeserializeOwned,
{
    fn decode(payload: Bytes) -> Result<Self, CodecError> {
        serde_json::from_slice(&payload)
            .map(Json)
            .map_err(CodecError::DecodeJson)
    }
}
