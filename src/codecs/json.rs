//! JSON codec using `serde_json`. The default [`crate::codec::Codec`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, CodecError};

#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}
