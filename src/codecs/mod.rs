//! Concrete [`crate::codec::Codec`] implementations.

mod json;
pub use json::JsonCodec;

#[cfg(feature = "bincode")]
mod bincode_codec;
#[cfg(feature = "bincode")]
pub use bincode_codec::BincodeCodec;
