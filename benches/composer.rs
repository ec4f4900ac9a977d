//! Benchmarks for `Composer`: multi-tier probe latency on a hit at
//! each tier depth, and the cost of the natural-backfill unwind.
//! Backed by `FakeStore`, no live Redis required.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::builder::ComposerBuilder;
use tiered_cache::envelope::encode_present;
use tiered_cache::testutil::FakeStore;
use tiered_cache::{JsonCodec, Options, StableTier, Tier};
use tokio::runtime::Runtime;

fn stable_tier(store: Arc<FakeStore>) -> Arc<dyn Tier> {
    Arc::new(StableTier::new(store, JsonCodec, Options::new()))
}

/// A three-tier composer with the value seeded only at tier `hit_depth`
/// (0-indexed), so every shallower tier must be probed and miss first.
fn setup(hit_depth: usize) -> (tiered_cache::Composer<JsonCodec>, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let stores: Vec<Arc<FakeStore>> = (0..3).map(|_| Arc::new(FakeStore::new())).collect();
    rt.block_on(async {
        stores[hit_depth].put_raw("bench:composer:key", encode_present(br#""value""#)).await;
    });

    let mut builder = ComposerBuilder::new();
    for store in &stores {
        builder = builder.with_tier(stable_tier(store.clone()), Duration::from_secs(60));
    }
    (builder.build(), rt)
}

fn bench_probe_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("composer_probe_depth");
    for depth in &[0usize, 1, 2] {
        let (composer, rt) = setup(*depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let value: String = composer
                        .get_or_load("bench:composer:key", || async { panic!("loader must not run: value is seeded") })
                        .await
                        .unwrap_or_else(|_| panic!("failed to load"));
                    black_box(value);
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_probe_depth);
criterion_main!(benches);
