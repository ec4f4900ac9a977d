//! Wire framing for cached values.
//!
//! A stored entry is either a payload or an explicit marker that the
//! underlying loader reported "not found" for that key (a negative
//! cache entry). The frame is one leading tag byte followed by the
//! payload bytes, if any:
//!
//! ```text
//! [0]              -> absent
//! [1, p0, p1, ...] -> present, payload = p0, p1, ...
//! ```
//!
//! A zero-length stored value is always [`CacheError::Corrupt`] — a
//! real write always emits at least the tag byte, so an empty read
//! means whatever wrote it was truncated or it was never a valid
//! envelope to begin with.

use bytes::Bytes;

use crate::error::CacheError;

const TAG_ABSENT: u8 = 0;
const TAG_PRESENT: u8 = 1;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// The loader produced a value for this key.
    Present(Bytes),
    /// The loader reported the key does not exist.
    Absent,
}

/// Encode a present value.
pub fn encode_present(payload: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(TAG_PRESENT);
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

/// Encode the absent marker.
pub fn encode_absent() -> Bytes {
    Bytes::from_static(&[TAG_ABSENT])
}

/// Decode a stored frame back into an [`Envelope`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, CacheError> {
    match bytes.first() {
        None => Err(CacheError::Corrupt),
        Some(&TAG_ABSENT) => Ok(Envelope::Absent),
        Some(&TAG_PRESENT) => Ok(Envelope::Present(Bytes::copy_from_slice(&bytes[1..]))),
        Some(_) => Err(CacheError::Corrupt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_present() {
        let encoded = encode_present(b"hello");
        match decode(&encoded).expect("decodes") {
            Envelope::Present(payload) => assert_eq!(&payload[..], b"hello"),
            Envelope::Absent => panic!("expected present"),
        }
    }

    #[test]
    fn round_trips_present_empty_payload() {
        let encoded = encode_present(b"");
        match decode(&encoded).expect("decodes") {
            Envelope::Present(payload) => assert!(payload.is_empty()),
            Envelope::Absent => panic!("expected present"),
        }
    }

    #[test]
    fn round_trips_absent() {
        let encoded = encode_absent();
        assert_eq!(decode(&encoded).expect("decodes"), Envelope::Absent);
    }

    #[test]
    fn empty_input_is_corrupt() {
        assert!(matches!(decode(&[]), Err(CacheError::Corrupt)));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        assert!(matches!(decode(&[7, 1, 2]), Err(CacheError::Corrupt)));
    }
}
