//! The contract every layer of a [`crate::composer::Composer`] implements.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheError;

/// What a loader produced.
pub enum LoaderOutcome {
    /// The loader found a value, already encoded by the caller's codec.
    Present(Bytes),
    /// The loader determined the key does not exist. A tier stores
    /// this as a negative entry (an absent envelope) with
    /// [`crate::options::Options::negative_ttl`], so a repeated miss
    /// does not repeat the loader call.
    NotFound,
}

pub type BoxLoaderFuture = Pin<Box<dyn Future<Output = Result<LoaderOutcome, CacheError>> + Send>>;
pub type BoxLoader = Box<dyn FnOnce() -> BoxLoaderFuture + Send>;

/// One layer in a [`crate::composer::Composer`] chain.
///
/// Dyn-compatible and byte-oriented so heterogeneous tiers (a
/// `StableTier<RedisStore, JsonCodec>` next to an in-process
/// `MokaTier`) can live together in one `Vec<Arc<dyn Tier>>`. Each
/// concrete tier additionally exposes its own typed `get_or_load`
/// inherent method for standalone use, built on top of this same
/// byte-level operation using its own configured codec.
#[async_trait]
pub trait Tier: Send + Sync {
    /// Probe this tier; on miss, run `loader`, cache what it returns
    /// (including a negative entry for [`LoaderOutcome::NotFound`]),
    /// and return the resulting payload bytes. Returns
    /// [`CacheError::NotFound`] if the tier (or the loader) determined
    /// the key does not exist.
    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Duration,
        loader: BoxLoader,
    ) -> Result<Bytes, CacheError>;

    /// Remove one or more keys from this tier.
    async fn del(&self, keys: &[&str]) -> Result<(), CacheError>;

    fn name(&self) -> &'static str {
        "tier"
    }
}

/// Key validation shared by every adapter: `StableTier`, `UnstableTier`
/// and `Composer` all reject an empty key before touching the remote
/// store. `InvalidLoader`/`InvalidDest` (spec.md §6.4, mirroring the
/// original's nil-loader/nil-destination checks) have no equivalent
/// trigger here: a `FnOnce` loader can't be absent and the destination
/// is the call's own type parameter, not an out-pointer, so Rust's
/// type system rules both cases out at compile time rather than at
/// runtime. The variants stay on `CacheError` for parity with the
/// spec's error enum; they are simply unreachable through this API.
pub(crate) fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}
