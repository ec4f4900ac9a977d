//! The contract both tier adapters read and write through.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by a [`RemoteStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store connection error: {0}")]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    #[error("remote store command failed: {0}")]
    Command(Box<dyn std::error::Error + Send + Sync>),

    #[error("operation timed out")]
    Timeout,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// One page of a cursor-based key scan. A `cursor` of `0` means the
/// scan has completed.
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// The minimal remote key-value contract [`crate::stable::StableTier`]
/// and [`crate::unstable::UnstableTier`] are written against. A
/// concrete implementation (e.g. [`crate::redis_store::RedisStore`])
/// owns connection management, reconnection, and cluster topology;
/// this trait exposes none of that to its callers.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a value. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store a value with an expiration.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Delete zero or more keys, returning the number actually removed.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Atomically increment a counter key, returning the new value.
    /// Used for version-based invalidation.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// One page of a non-blocking cursor scan for keys matching
    /// `pattern`. Implementations should request roughly `batch` keys
    /// per underlying round-trip, though the exact count returned is
    /// not guaranteed.
    async fn scan(&self, cursor: u64, pattern: &str, batch: usize) -> Result<ScanPage, StoreError>;

    /// Drive [`RemoteStore::scan`] to completion and collect every
    /// matching key. The default implementation loops a single
    /// connection; a cluster-aware store overrides this to fan the
    /// same loop out across every master concurrently.
    async fn scan_keys(&self, pattern: &str, batch: usize) -> Result<Vec<String>, StoreError> {
        let mut cursor = 0u64;
        let mut keys = Vec::new();
        loop {
            let page = self.scan(cursor, pattern, batch).await?;
            keys.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    /// Optional compare-and-delete support for stores that can run a
    /// server-side script. Not used by [`crate::stable::StableTier`] or
    /// [`crate::unstable::UnstableTier`]; present for store
    /// implementations that want to reuse the trait for other
    /// coordination primitives.
    async fn eval_del_if_match(&self, _key: &str, _expected: &[u8]) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("EVAL"))
    }

    /// Whether this store fans operations out across multiple nodes.
    /// [`RemoteStore::scan_keys`]'s default single-connection loop is
    /// correct either way; this exists for callers that want to log or
    /// branch on topology without a type switch.
    fn is_cluster(&self) -> bool {
        false
    }
}
