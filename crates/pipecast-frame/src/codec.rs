use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced by a [`Codec`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by a custom codec.
    #[error("codec error: {0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// Turns values into message payloads and back.
///
/// The payload is the entire message body; codecs must not add their own
/// framing.
pub trait Codec: Send + Sync + 'static {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Encode a value into a message payload.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode a message payload into a value.
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError>;
}

/// UTF-8 JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
