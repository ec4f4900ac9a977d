//! End-to-end scenarios for `StableTier`, spec.md §8 scenarios 1-2.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiered_cache::testutil::FakeStore;
use tiered_cache::{CacheError, JsonCodec, Options, StableTier};

use common::test_data::User;

/// Scenario 1: stable cache hit-after-miss.
#[tokio::test]
async fn hit_after_miss() {
    common::init_tracing();
    let store = Arc::new(FakeStore::new());
    let tier = StableTier::new(store, JsonCodec, Options::new().with_prefix("myapp"));

    let first = tier
        .get_or_load("user:1", Duration::from_secs(300), || async { Ok(Some(User::new(1))) })
        .await
        .expect("loads");
    assert_eq!(first, User::new(1));

    tokio::time::sleep(Duration::from_millis(60)).await;

    // A loader that would return a different value must not be
    // invoked: the second call is a cache hit.
    let second: User = tier
        .get_or_load("user:1", Duration::from_secs(300), || async {
            Ok(Some(User { id: 1, name: "Bob".to_string() }))
        })
        .await
        .expect("hits cache");
    assert_eq!(second, User::new(1));
}

/// Scenario 2: negative cache round-trip.
#[tokio::test]
async fn negative_cache_round_trip() {
    let store = Arc::new(FakeStore::new());
    let tier = StableTier::new(store, JsonCodec, Options::new().with_negative_ttl(Duration::from_secs(60)));

    let result: Result<User, CacheError> = tier.get_or_load("user:999", Duration::from_secs(300), || async { Ok(None) }).await;
    assert!(matches!(result, Err(CacheError::NotFound)));

    // The negative envelope write-back runs on a detached task.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result2: Result<User, CacheError> = tier
        .get_or_load("user:999", Duration::from_secs(300), move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(User::new(999))) }
        })
        .await;
    assert!(matches!(result2, Err(CacheError::NotFound)));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "negative cache hit, loader not called");
}

#[tokio::test]
async fn set_bypasses_load_path() {
    let store = Arc::new(FakeStore::new());
    let tier = StableTier::new(store, JsonCodec, Options::new());

    tier.set("user:5", &User::new(5), Duration::from_secs(60)).await.expect("writes through");

    let value: User = tier
        .get_or_load("user:5", Duration::from_secs(60), || async { panic!("loader should not run: set already filled the cache") })
        .await
        .expect("reads back the written value");
    assert_eq!(value, User::new(5));
}

#[tokio::test]
async fn del_removes_exact_key() {
    let store = Arc::new(FakeStore::new());
    let tier = StableTier::new(store, JsonCodec, Options::new());

    tier.set("user:7", &User::new(7), Duration::from_secs(60)).await.expect("writes");
    tier.del(&["user:7"]).await.expect("deletes");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let value: User = tier
        .get_or_load("user:7", Duration::from_secs(60), move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(User::new(7))) }
        })
        .await
        .expect("loader invoked after delete");
    assert_eq!(value, User::new(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
