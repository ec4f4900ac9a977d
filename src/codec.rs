//! Pluggable value (de)serialization, independent of the envelope
//! framing in [`crate::envelope`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while encoding or decoding a value through a [`Codec`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec failed: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "bincode")]
    #[error("bincode codec failed: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Converts typed values to and from bytes for storage in a tier.
///
/// Distinct from [`crate::envelope`]: the codec only ever sees the
/// payload of a `Present` envelope, never the tag byte.
pub trait Codec: Send + Sync + std::fmt::Debug {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
    fn name(&self) -> &'static str;
}
