//! Bincode codec, enabled with the `bincode` feature.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, CodecError};

#[derive(Debug, Default, Clone)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn name(&self) -> &'static str {
        "bincode"
    }
}
