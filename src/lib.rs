//! A tiered read-through cache coordinator.
//!
//! Composes an ordered list of cache layers ([`tier::Tier`]
//! implementations) plus a terminal loader into one
//! `get_or_load(key, loader)` call: probe layers in order, fall
//! through to the loader on a full miss, and cache the loader's
//! result — including "not found" — back across the layers it passed
//! through.
//!
//! Two ready-made layers are provided:
//! - [`stable::StableTier`] — single-record, exact-key caching with
//!   precise invalidation.
//! - [`unstable::UnstableTier`] — aggregate/list caching, invalidated
//!   by a version bump or a key-pattern scan rather than by
//!   enumerating keys.
//!
//! Both are generic over [`remote::RemoteStore`] (satisfied by
//! [`redis_store::RedisStore`]) and [`codec::Codec`] (default
//! [`codecs::JsonCodec`]). [`local::MokaTier`] is an in-process leaf
//! layer for the fastest position in a composition.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tiered_cache::builder::ComposerBuilder;
//! use tiered_cache::local::MokaTier;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let composer = ComposerBuilder::new()
//!     .with_tier(Arc::new(MokaTier::default()), Duration::from_secs(300))
//!     .build();
//!
//! let name: String = composer
//!     .get_or_load("user:1", || async { Ok(Some("Alice".to_string())) })
//!     .await
//!     .expect("loads");
//! assert_eq!(name, "Alice");
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod codecs;
pub mod composer;
pub mod envelope;
pub mod error;
#[cfg(feature = "moka")]
pub mod local;
pub mod options;
pub mod remote;
pub mod single_flight;
pub mod stable;
pub mod tier;
pub mod unstable;

#[cfg(feature = "redis")]
pub mod redis_store;

/// In-memory [`remote::RemoteStore`] fake, for tests that need
/// deterministic tier/composer behavior without a live Redis. Not
/// covered by semver — kept `pub` (rather than `#[cfg(test)]`) only so
/// this crate's own `tests/` integration suite can reach it; treat it
/// as a dev dependency, not part of the stable API.
#[doc(hidden)]
pub mod testutil;

pub use builder::ComposerBuilder;
pub use codec::{Codec, CodecError};
pub use codecs::JsonCodec;
#[cfg(feature = "bincode")]
pub use codecs::BincodeCodec;
pub use composer::Composer;
pub use envelope::Envelope;
pub use error::CacheError;
#[cfg(feature = "moka")]
pub use local::MokaTier;
pub use options::Options;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use remote::{RemoteStore, ScanPage, StoreError};
pub use stable::StableTier;
pub use tier::Tier;
pub use unstable::UnstableTier;

// Re-export async_trait for downstream `RemoteStore`/`Tier` impls.
pub use async_trait::async_trait;
