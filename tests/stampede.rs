//! Cache-stampede coalescing at the composer level (testable property 3):
//! N concurrent callers for the same key invoke the loader exactly once.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiered_cache::builder::ComposerBuilder;
use tiered_cache::testutil::FakeStore;
use tiered_cache::{JsonCodec, Options, StableTier, Tier};

fn stable_tier(store: Arc<FakeStore>) -> Arc<dyn Tier> {
    Arc::new(StableTier::new(store, JsonCodec, Options::new()))
}

#[tokio::test]
async fn concurrent_callers_coalesce_into_one_loader_invocation() {
    common::init_tracing();
    let store = Arc::new(FakeStore::new());
    let composer = Arc::new(ComposerBuilder::new().with_tier(stable_tier(store), Duration::from_secs(60)).build());

    let calls = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(16);
    for _ in 0..16 {
        let composer = composer.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            composer
                .get_or_load("stampede:1", move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(Some("winner".to_string()))
                    }
                })
                .await
        }));
    }

    for handle in handles {
        let value: String = handle.await.expect("task panicked").expect("loads");
        assert_eq!(value, "winner");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the leader should have invoked the loader");
}

/// Once the in-flight load settles and writes back, a later caller
/// observes a plain cache hit rather than coalescing into anything.
#[tokio::test]
async fn settled_load_is_a_cache_hit_not_a_new_coalesce() {
    let store = Arc::new(FakeStore::new());
    let composer = ComposerBuilder::new().with_tier(stable_tier(store), Duration::from_secs(60)).build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let first: String = composer
        .get_or_load("stampede:2", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some("value".to_string())) }
        })
        .await
        .expect("loads");
    assert_eq!(first, "value");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls_clone = calls.clone();
    let second: String = composer
        .get_or_load("stampede:2", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { panic!("loader should not run: cache hit") }
        })
        .await
        .expect("hits cache");
    assert_eq!(second, "value");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
