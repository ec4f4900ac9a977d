//! Shared helpers for the integration suite.
//!
//! Unlike the teacher's `tests/common/mod.rs` (which dialed a live
//! Redis via `REDIS_URL`), every test in this suite runs against
//! [`tiered_cache::testutil::FakeStore`] so the suite is deterministic
//! in CI without external services.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber once per test binary, the way the
/// teacher's test setup does, so `RUST_LOG=debug cargo test` surfaces
/// the library's `debug!`/`warn!` calls.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    });
}

/// A unique-ish key per test run so tests sharing a `FakeStore` in a
/// single process don't collide.
pub fn test_key(name: &str) -> String {
    format!("{name}_{}", rand::random::<u32>())
}

pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self { id, name: format!("User {id}") }
        }
    }
}
