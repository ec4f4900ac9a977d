//! In-process leaf [`Tier`], backed by `moka`.
//!
//! Out of spec.md's core scope (§1: "The local in-process tier
//! implementation ... is otherwise a leaf dependency"), but shipped so
//! a [`crate::composer::Composer`] is usable end-to-end without a live
//! Redis for its fastest tier — the way the teacher ships
//! `backends::MokaCache` as the default L1 alongside the production
//! `RedisCache`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;

use crate::envelope::{self, Envelope};
use crate::error::CacheError;
use crate::single_flight::SingleFlight;
use crate::tier::{validate_key, BoxLoader, LoaderOutcome, Tier};

/// An envelope plus its own expiry, since `moka`'s blanket
/// `time_to_live` is one fixed duration per cache instance and this
/// tier is written with a different TTL on every call (jittered
/// present writes, a separate negative TTL). Grounded on the
/// teacher's `backends/moka_cache.rs::CacheEntry` (`value` +
/// `expires_at`, checked with `is_expired` on read).
#[derive(Clone)]
struct Entry {
    bytes: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn new(bytes: Bytes, ttl: Duration) -> Self {
        Self {
            bytes,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A [`Tier`] over an in-process `moka::future::Cache`, storing the
/// same envelope frame (§4.1) the remote tiers do, so a negative
/// result backfilled from a slower tier is represented identically
/// here.
pub struct MokaTier {
    cache: Cache<String, Entry>,
    in_flight: SingleFlight,
}

impl MokaTier {
    /// `max_capacity` bounds the number of entries; eviction beyond
    /// that is moka's own approximate-LRU policy. Per-key expiry is
    /// tracked explicitly in [`Entry`] rather than via moka's own
    /// `time_to_live`, so each write can carry its own TTL.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
            in_flight: SingleFlight::new(),
        }
    }
}

impl Default for MokaTier {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl Tier for MokaTier {
    async fn get_or_load_bytes(&self, key: &str, ttl: Duration, loader: BoxLoader) -> Result<Bytes, CacheError> {
        validate_key(key)?;

        if let Some(entry) = self.cache.get(key).await {
            if entry.is_expired() {
                self.cache.remove(key).await;
            } else {
                return match envelope::decode(&entry.bytes)? {
                    Envelope::Present(payload) => Ok(payload),
                    Envelope::Absent => Err(CacheError::NotFound),
                };
            }
        }

        let cache = self.cache.clone();
        let key_owned = key.to_string();
        self.in_flight
            .run(key, move || async move {
                if let Some(entry) = cache.get(&key_owned).await {
                    if !entry.is_expired() {
                        return Ok(entry.bytes);
                    }
                }

                match loader().await {
                    Ok(LoaderOutcome::Present(payload)) => {
                        let envelope = envelope::encode_present(&payload);
                        cache.insert(key_owned.clone(), Entry::new(envelope.clone(), ttl)).await;
                        Ok(envelope)
                    }
                    Ok(LoaderOutcome::NotFound) => {
                        let envelope = envelope::encode_absent();
                        cache.insert(key_owned.clone(), Entry::new(envelope, ttl)).await;
                        Err(CacheError::NotFound)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
    }

    async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            self.cache.remove(*key).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn present(payload: &str) -> BoxLoader {
        let payload = Bytes::from(payload.to_string());
        Box::new(move || Box::pin(async move { Ok(LoaderOutcome::Present(payload)) }))
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let tier = MokaTier::default();
        let bytes = tier.get_or_load_bytes("k1", Duration::from_secs(60), present("hello")).await.expect("loads");
        assert_eq!(&bytes[..], b"hello");

        let cached = tier
            .get_or_load_bytes("k1", Duration::from_secs(60), Box::new(|| Box::pin(async { panic!("should not run") })))
            .await
            .expect("cache hit");
        assert_eq!(&cached[..], b"hello");
    }

    #[tokio::test]
    async fn not_found_is_negative_cached() {
        let tier = MokaTier::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let loader: BoxLoader = Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(LoaderOutcome::NotFound) })
        });
        let result = tier.get_or_load_bytes("missing", Duration::from_secs(60), loader).await;
        assert!(matches!(result, Err(CacheError::NotFound)));

        let calls_clone = calls.clone();
        let loader2: BoxLoader = Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(LoaderOutcome::Present(Bytes::from_static(b"unused"))) })
        });
        let result2 = tier.get_or_load_bytes("missing", Duration::from_secs(60), loader2).await;
        assert!(matches!(result2, Err(CacheError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn del_clears_entry() {
        let tier = MokaTier::default();
        tier.get_or_load_bytes("k1", Duration::from_secs(60), present("x")).await.expect("loads");
        tier.del(&["k1"]).await.expect("deletes");

        let result = tier
            .get_or_load_bytes("k1", Duration::from_secs(60), present("y"))
            .await
            .expect("reloads after delete");
        assert_eq!(&result[..], b"y");
    }
}
