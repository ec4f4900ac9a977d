//! Request coalescing keyed by effective key.
//!
//! Unlike a bare `Mutex`-per-key (which only serializes callers so
//! that each one redundantly repeats the probe-then-load sequence),
//! [`SingleFlight`] shares the *result* of the first caller's future
//! with every other caller that arrives for the same key while it is
//! still running: the loader itself runs exactly once.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::CacheError;

type SharedResult = Result<bytes::Bytes, SharedCacheError>;
type InFlightFuture = Shared<BoxFuture<'static, SharedResult>>;

/// [`CacheError`] does not implement `Clone` (it can box an arbitrary
/// loader error), but [`Shared`] requires its output to be `Clone` so
/// every waiter can receive a copy. This wraps the error's rendered
/// message instead of the original value; the leader's caller still
/// sees the original `CacheError` returned directly, only followers
/// see this reduced form.
#[derive(Debug, Clone)]
pub struct SharedCacheError(pub Arc<str>);

impl std::fmt::Display for SharedCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SharedCacheError {}

impl From<&CacheError> for SharedCacheError {
    fn from(err: &CacheError) -> Self {
        SharedCacheError(Arc::from(err.to_string()))
    }
}

/// A map of effective key to the in-progress load for that key.
#[derive(Default)]
pub struct SingleFlight {
    in_flight: DashMap<String, InFlightFuture>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Run `loader` for `key`, coalescing with any load already in
    /// flight for the same key. The caller that actually starts the
    /// load (the "leader") runs `loader` directly and returns its real
    /// error unchanged; callers that join an in-progress load
    /// (followers) wait on a [`SharedCacheError`] echo of it published
    /// once the leader finishes, since the original error is not
    /// `Clone` and can only be delivered once.
    pub async fn run<F, Fut>(&self, key: &str, loader: F) -> Result<bytes::Bytes, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<bytes::Bytes, CacheError>> + Send + 'static,
    {
        let key_owned = key.to_string();

        // Join an in-flight load for this key, if one exists.
        if let Some(shared) = self.in_flight.get(&key_owned).map(|entry| entry.value().clone()) {
            return shared.await.map_err(|e| CacheError::loader_msg(e.to_string()));
        }

        // Publish a follower-facing echo of our result once we have
        // one; followers subscribe to this before we start loading.
        let (tx, rx) = oneshot::channel::<SharedResult>();
        let fut: BoxFuture<'static, SharedResult> = async move {
            rx.await.unwrap_or_else(|_| Err(SharedCacheError(Arc::from("single-flight leader dropped"))))
        }
        .boxed();
        let shared: InFlightFuture = fut.shared();

        match self.in_flight.entry(key_owned.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                // Another caller became leader between our initial
                // lookup and now; join them instead.
                let shared = occupied.get().clone();
                drop(occupied);
                return shared.await.map_err(|e| CacheError::loader_msg(e.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(shared);
            }
        }

        let _cleanup = CleanupGuard {
            map: &self.in_flight,
            key: key_owned,
        };

        let result = loader().await;
        let echo = match &result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(err) => Err(SharedCacheError::from(err)),
        };
        let _ = tx.send(echo);
        result
    }
}

struct CleanupGuard<'a> {
    map: &'a DashMap<String, InFlightFuture>,
    key: String,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
