//! Sentinel errors shared by every component.

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::remote::StoreError;

/// Errors a caller of this crate can observe.
///
/// `NotFound`, `InvalidKey`, `InvalidLoader`, `InvalidDest`, `NoLayers`
/// and `Corrupt` are sentinels: callers match on them directly rather
/// than inspecting message text. `Store`/`Codec` wrap the lower layers
/// verbatim; `Loader` carries whatever error the caller's own loader
/// closure returned.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No tier and no terminal loader produced a value for the key.
    #[error("key not found")]
    NotFound,

    /// An empty or otherwise unusable key was passed to an operation.
    #[error("key must not be empty")]
    InvalidKey,

    /// A loader was required but not supplied.
    #[error("loader must be provided")]
    InvalidLoader,

    /// The requested destination type does not match the cached payload.
    #[error("destination type mismatch or invalid")]
    InvalidDest,

    /// A composer was built with zero tiers.
    #[error("composer has no configured layers")]
    NoLayers,

    /// A stored envelope could not be parsed.
    #[error("corrupt cache entry")]
    Corrupt,

    /// The remote store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configured codec failed to encode or decode a value.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The caller-supplied loader failed.
    #[error("loader failed: {0}")]
    Loader(Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wrap an arbitrary loader error.
    pub fn loader<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::Loader(Box::new(err))
    }

    /// Wrap a loader error that is just a message.
    pub fn loader_msg(msg: impl Into<String>) -> Self {
        CacheError::Loader(Box::new(LoaderMessage(msg.into())))
    }
}

#[derive(Debug)]
struct LoaderMessage(String);

impl fmt::Display for LoaderMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LoaderMessage {}

/// The default "is this a not-found result" predicate: matches
/// [`CacheError::NotFound`] only. Callers supplying a custom predicate
/// in [`crate::options::Options`] may widen this, e.g. to also treat a
/// domain-specific "record deleted" loader error as not-found.
pub fn default_is_not_found(err: &CacheError) -> bool {
    matches!(err, CacheError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicate_matches_only_not_found() {
        assert!(default_is_not_found(&CacheError::NotFound));
        assert!(!default_is_not_found(&CacheError::Corrupt));
        assert!(!default_is_not_found(&CacheError::InvalidKey));
    }

    #[test]
    fn loader_msg_displays_message() {
        let err = CacheError::loader_msg("boom");
        assert_eq!(err.to_string(), "loader failed: boom");
    }
}
