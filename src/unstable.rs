//! Version- and pattern-invalidated aggregate cache tier. §4.3.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::codec::Codec;
use crate::error::CacheError;
use crate::options::Options;
use crate::remote::{RemoteStore, StoreError};
use crate::stable::StableTier;
use crate::tier::{validate_key, BoxLoader, Tier};

/// How often the in-memory version is allowed to refresh from the
/// remote store. Spec floor is 1 second.
pub const VERSION_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
/// Deadline for the version-key read during a refresh.
const VERSION_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Scan batch size for pattern invalidation.
const SCAN_BATCH: usize = 100;
/// Stand-in for "no expiry" when seeding the version key, since
/// `RemoteStore::set` always takes a concrete TTL.
const NO_EXPIRY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Caches aggregate results (joins, derived lists) where invalidating
/// by exact key is infeasible. Entries are keyed by `key:v<version>`
/// so a version bump invalidates every entry written under the old
/// version without deleting anything.
pub struct UnstableTier<S, C> {
    inner: StableTier<S, C>,
    store: Arc<S>,
    options: Options,
    version_key: String,
    version: AtomicI64,
    epoch: OnceLock<Instant>,
    last_refresh_millis: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl<S, C> UnstableTier<S, C>
where
    S: RemoteStore + 'static,
    C: Codec + Clone + 'static,
{
    pub fn new(store: Arc<S>, codec: C, version_key: impl Into<String>, options: Options) -> Self {
        Self {
            inner: StableTier::new(store.clone(), codec, options.clone()),
            store,
            options,
            version_key: version_key.into(),
            version: AtomicI64::new(1),
            epoch: OnceLock::new(),
            last_refresh_millis: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    fn millis_since_epoch(&self) -> u64 {
        self.epoch.get_or_init(Instant::now).elapsed().as_millis() as u64
    }

    fn within_refresh_interval(&self) -> bool {
        let now = self.millis_since_epoch();
        let last = self.last_refresh_millis.load(Ordering::SeqCst);
        now.saturating_sub(last) < VERSION_REFRESH_INTERVAL.as_millis() as u64
    }

    /// Throttled version refresh: at most once per
    /// [`VERSION_REFRESH_INTERVAL`], coalesced across concurrent
    /// callers by a single-flight section keyed by a constant (there
    /// is only ever one such section per tier, so a plain mutex
    /// guarding it is the whole single-flight group).
    async fn maybe_refresh_version(&self) {
        if self.within_refresh_interval() {
            return;
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check: another caller may have refreshed while we
        // waited for the lock.
        if self.within_refresh_interval() {
            return;
        }

        match timeout(self.options.read_timeout.min(VERSION_READ_TIMEOUT), self.store.get(&self.version_key)).await {
            Ok(Ok(Some(bytes))) => {
                if let Ok(remote_version) = std::str::from_utf8(&bytes).unwrap_or_default().parse::<i64>() {
                    let _ = self.version.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                        (remote_version > current).then_some(remote_version)
                    });
                }
            }
            Ok(Ok(None)) => {
                // No version key present yet: seed it with `1`. The
                // version key is meant to persist indefinitely; there
                // is no "no expiry" value in `RemoteStore::set`, so a
                // long TTL stands in for one.
                let _ = self.store.set(&self.version_key, Bytes::from_static(b"1"), NO_EXPIRY).await;
            }
            Ok(Err(err)) => {
                self.options.report_error("unstable", "version_refresh", &self.version_key, &CacheError::from(err));
            }
            Err(_) => {
                self.options.report_error("unstable", "version_refresh", &self.version_key, &CacheError::Store(StoreError::Timeout));
            }
        }

        // Update the timestamp unconditionally so a failed refresh
        // doesn't spin on every subsequent call within the interval.
        self.last_refresh_millis.store(self.millis_since_epoch(), Ordering::SeqCst);
    }

    fn versioned_key(&self, key: &str) -> String {
        format!("{key}:v{}", self.version())
    }

    /// Typed `GetOrLoad` against `key + ":v" + version`, refreshing
    /// the in-memory version first (throttled). Effective TTL is
    /// `min(ttl, MaxTTL)` before jitter.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Option<T>, CacheError>> + Send + 'static,
    {
        validate_key(key)?;
        self.maybe_refresh_version().await;
        let versioned = self.versioned_key(key);
        let capped_ttl = self.options.cap_ttl(ttl);
        self.inner.get_or_load(&versioned, capped_ttl, loader).await
    }

    /// Same as [`UnstableTier::get_or_load`] but without the version
    /// suffix, for entries invalidated by
    /// [`UnstableTier::invalidate_pattern`] rather than a version bump.
    pub async fn get_or_load_without_version<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Option<T>, CacheError>> + Send + 'static,
    {
        let capped_ttl = self.options.cap_ttl(ttl);
        self.inner.get_or_load(key, capped_ttl, loader).await
    }

    /// Atomically bump the remote version counter; previously written
    /// versioned entries become logically invisible.
    pub async fn invalidate_version(&self) -> Result<i64, CacheError> {
        let new_version = self.store.incr(&self.version_key).await?;
        let _ = self.version.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            (new_version > current).then_some(new_version)
        });
        Ok(self.version())
    }

    /// Enumerate and delete every remote key matching `pattern` via a
    /// cursor-paginated scan, fanned out across master nodes when the
    /// store is cluster-capable (delegated to
    /// [`RemoteStore::scan_keys`]'s implementation).
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut cursor = 0u64;
        let mut removed = 0u64;
        loop {
            let page = match timeout(self.options.write_timeout, self.store.scan(cursor, pattern, SCAN_BATCH)).await {
                Ok(Ok(page)) => page,
                Ok(Err(err)) => {
                    let err = CacheError::from(err);
                    self.options.report_error("unstable", "invalidate_pattern", pattern, &err);
                    return Err(err);
                }
                Err(_) => {
                    let err = CacheError::Store(StoreError::Timeout);
                    self.options.report_error("unstable", "invalidate_pattern", pattern, &err);
                    return Err(err);
                }
            };

            if !page.keys.is_empty() {
                match timeout(self.options.write_timeout, self.store.del(&page.keys)).await {
                    Ok(Ok(n)) => removed += n,
                    Ok(Err(err)) => {
                        let err = CacheError::from(err);
                        self.options.report_error("unstable", "invalidate_pattern", pattern, &err);
                        return Err(err);
                    }
                    Err(_) => {
                        let err = CacheError::Store(StoreError::Timeout);
                        self.options.report_error("unstable", "invalidate_pattern", pattern, &err);
                        return Err(err);
                    }
                }
            }

            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }

    pub async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        self.inner.del(keys).await
    }
}

#[async_trait]
impl<S, C> Tier for UnstableTier<S, C>
where
    S: RemoteStore + 'static,
    C: Codec + Clone + 'static,
{
    async fn get_or_load_bytes(&self, key: &str, ttl: Duration, loader: BoxLoader) -> Result<Bytes, CacheError> {
        validate_key(key)?;
        self.maybe_refresh_version().await;
        let versioned = self.versioned_key(key);
        let capped_ttl = self.options.cap_ttl(ttl);
        self.inner.get_or_load_bytes(&versioned, capped_ttl, loader).await
    }

    async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        self.inner.del(keys).await
    }

    fn name(&self) -> &'static str {
        "unstable"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codecs::JsonCodec;
    use crate::testutil::FakeStore;

    fn opts() -> Options {
        Options::new().with_max_ttl(Some(Duration::from_secs(900)))
    }

    #[tokio::test]
    async fn version_bump_invalidates_old_entries() {
        let store = Arc::new(FakeStore::new());
        let tier = UnstableTier::new(store.clone(), JsonCodec, "agg:version", opts());

        let first: String = tier
            .get_or_load("agg:1", Duration::from_secs(60), || async { Ok(Some("v1".to_string())) })
            .await
            .expect("loads");
        assert_eq!(first, "v1");

        tier.invalidate_version().await.expect("bumps version");

        let second: String = tier
            .get_or_load("agg:1", Duration::from_secs(60), || async { Ok(Some("v2".to_string())) })
            .await
            .expect("loads again under new version");
        assert_eq!(second, "v2");
    }

    #[tokio::test]
    async fn max_ttl_caps_requested_ttl() {
        let store = Arc::new(FakeStore::new());
        let tier = UnstableTier::new(store.clone(), JsonCodec, "agg2:version", Options::new().with_max_ttl(Some(Duration::from_secs(5))).with_jitter(0.0));

        let _: String = tier
            .get_or_load("agg2:1", Duration::from_secs(3600), || async { Ok(Some("v".to_string())) })
            .await
            .expect("loads");

        // The write-back to the store happens on a detached task; give
        // it a chance to land before inspecting the store directly.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let versioned = format!("agg2:1:v{}", tier.version());
        assert!(store.get_raw(&versioned).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_pattern_removes_matching_keys() {
        let store = Arc::new(FakeStore::new());
        store.put_raw("agg3:1", Bytes::from_static(b"\x01x")).await;
        store.put_raw("agg3:2", Bytes::from_static(b"\x01y")).await;
        store.put_raw("other:1", Bytes::from_static(b"\x01z")).await;

        let tier = UnstableTier::new(store.clone(), JsonCodec, "agg3:version", opts());
        let removed = tier.invalidate_pattern("agg3:").await.expect("invalidates");
        assert_eq!(removed, 2);
        assert!(store.get_raw("other:1").await.is_some());
    }
}
