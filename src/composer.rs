//! Multi-tier read-through orchestrator. §4.4.
//!
//! The composer never implements tier fallthrough as its own loop.
//! Instead it wires tiers together as nested loaders:
//! `tiers[0].get_or_load_bytes(key, ttl0, L0)` where `L0`, called only
//! if tier 0 misses, invokes `tiers[1].get_or_load_bytes(key, ttl1, L1)`,
//! and so on until the innermost loader is the caller's own. Each
//! tier's own degrade-on-remote-error behavior (§4.2, §4.3) already
//! implements "skip to the next tier on any error but `NotFound`" —
//! the composer does not duplicate that classification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::warn;

use crate::codec::Codec;
use crate::error::CacheError;
use crate::options::Options;
use crate::tier::{validate_key, BoxLoader, BoxLoaderFuture, LoaderOutcome, Tier};

/// Ceiling on the explicit backfill pass, regardless of value size or
/// tier count (spec.md §9: a fixed policy, not yet made configurable).
pub const BACKFILL_TIMEOUT: Duration = Duration::from_secs(5);

/// One layer of a [`Composer`]: a tier plus the TTL it is probed with.
struct Layer {
    tier: Arc<dyn Tier>,
    ttl: Duration,
}

/// An ordered composition of [`Tier`]s plus a terminal user loader,
/// exposed as a single [`Composer::get_or_load`] call.
///
/// Construct with [`crate::builder::ComposerBuilder`]. Layers are
/// immutable after construction; tier 0 is probed first and is
/// expected to be the fastest/coldest-data layer.
pub struct Composer<C> {
    layers: Vec<Layer>,
    codec: C,
    options: Options,
}

impl<C> Composer<C>
where
    C: Codec + Clone + 'static,
{
    pub(crate) fn new(layers: Vec<(Arc<dyn Tier>, Duration)>, codec: C, options: Options) -> Self {
        Self {
            layers: layers.into_iter().map(|(tier, ttl)| Layer { tier, ttl }).collect(),
            codec,
            options,
        }
    }

    /// Number of configured tiers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Probe tiers in order, falling through to `loader` when none
    /// hold the key, and backfilling faster tiers on a slower-tier
    /// hit. `loader` returns `Ok(None)` for not-found.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Option<T>, CacheError>> + Send + 'static,
    {
        validate_key(key)?;
        if self.layers.is_empty() {
            return Err(CacheError::NoLayers);
        }

        let codec = self.codec.clone();
        let user_loader: BoxLoader = Box::new(move || {
            Box::pin(async move {
                match loader().await? {
                    Some(value) => {
                        let payload = codec.encode(&value)?;
                        Ok(LoaderOutcome::Present(Bytes::from(payload)))
                    }
                    None => Ok(LoaderOutcome::NotFound),
                }
            })
        });

        let tiers: Arc<[Arc<dyn Tier>]> = self.layers.iter().map(|l| l.tier.clone()).collect();
        let ttls: Arc<[Duration]> = self.layers.iter().map(|l| l.ttl).collect();
        let chain = build_loader(tiers.clone(), ttls.clone(), key.to_string(), 1, user_loader);

        let result = self.layers[0].tier.get_or_load_bytes(key, self.layers[0].ttl, chain).await;

        match result {
            Ok(bytes) => {
                if !self.options.skip_backfill {
                    self.spawn_backfill(key, bytes.clone(), tiers, ttls);
                }
                self.codec.decode(&bytes).map_err(CacheError::from)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete `keys` from every tier. Attempted on all tiers
    /// regardless of earlier failures; the last error encountered (if
    /// any) is returned, but every tier's own failure is also reported
    /// to the observer individually. Not atomic across tiers (§5): a
    /// concurrent read between deleting tier 0 and tier N-1 may
    /// repopulate an earlier tier from a later one.
    pub async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut last_err = None;
        for layer in &self.layers {
            if let Err(err) = layer.tier.del(keys).await {
                self.options.report_error(layer.tier.name(), "del", &keys.join(","), &err);
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Explicit out-of-band backfill: propagate `bytes` into every
    /// tier concurrently, for tiers that natural backfill (the nested
    /// unwind above) did not reach — e.g. a tier that degraded past
    /// its own probe error and so skipped its own cache-write step.
    /// Detached from the caller: never observed by `get_or_load`,
    /// bounded by [`BACKFILL_TIMEOUT`], errors only reported.
    fn spawn_backfill(&self, key: &str, bytes: Bytes, tiers: Arc<[Arc<dyn Tier>]>, ttls: Arc<[Duration]>) {
        let key = key.to_string();
        let options = self.options.clone();
        let deadline = Instant::now() + BACKFILL_TIMEOUT;
        tokio::spawn(async move {
            let mut handles = Vec::with_capacity(tiers.len());
            for (tier, ttl) in tiers.iter().zip(ttls.iter()) {
                let tier = tier.clone();
                let ttl = *ttl;
                let key = key.clone();
                let bytes = bytes.clone();
                let options = options.clone();
                handles.push(tokio::spawn(async move {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let trivial: BoxLoader = Box::new(move || {
                        let bytes = bytes.clone();
                        Box::pin(async move { Ok(LoaderOutcome::Present(bytes)) }) as BoxLoaderFuture
                    });
                    match timeout(remaining, tier.get_or_load_bytes(&key, ttl, trivial)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(CacheError::NotFound)) => {}
                        Ok(Err(err)) => options.report_error(tier.name(), "backfill", &key, &err),
                        Err(_) => {
                            // Backfill timeout: silently absorbed per spec.md §4.4.
                            warn!(tier = tier.name(), key = %key, "backfill deadline exceeded");
                        }
                    }
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
        });
    }
}

/// Recursively build the loader tier `index` sees. `index == tiers.len()`
/// is the base case: the caller's own loader.
fn build_loader(
    tiers: Arc<[Arc<dyn Tier>]>,
    ttls: Arc<[Duration]>,
    key: String,
    index: usize,
    user_loader: BoxLoader,
) -> BoxLoader {
    if index >= tiers.len() {
        return user_loader;
    }

    Box::new(move || {
        Box::pin(async move {
            let next = build_loader(tiers.clone(), ttls.clone(), key.clone(), index + 1, user_loader);
            match tiers[index].get_or_load_bytes(&key, ttls[index], next).await {
                Ok(bytes) => Ok(LoaderOutcome::Present(bytes)),
                Err(CacheError::NotFound) => Ok(LoaderOutcome::NotFound),
                Err(err) => Err(err),
            }
        })
    })
}
