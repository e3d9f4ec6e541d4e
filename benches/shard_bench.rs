//! Benchmarks the O(1)-amortized claim on the LRU shard's hot path: repeated
//! `put`/`get` under steady-state eviction pressure.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ramcache::storage::shard::Shard;
use ramcache::storage::striped::StripedStore;

fn bench_shard_put_under_eviction_pressure(c: &mut Criterion) {
    let mut shard = Shard::new(64 * 1024);
    let mut i: u64 = 0;
    c.bench_function("shard_put_steady_state", |b| {
        b.iter(|| {
            let key = i.to_le_bytes();
            shard.put(black_box(&key), black_box(b"0123456789abcdef"));
            i += 1;
        })
    });
}

fn bench_shard_get_hit(c: &mut Criterion) {
    let mut shard = Shard::new(64 * 1024);
    shard.put(b"hot-key", b"0123456789abcdef");
    let mut out = Vec::new();
    c.bench_function("shard_get_hit", |b| {
        b.iter(|| {
            shard.get(black_box(b"hot-key"), &mut out);
        })
    });
}

fn bench_striped_store_put_across_shards(c: &mut Criterion) {
    let store = StripedStore::new(4 * 1024 * 1024, 64).unwrap();
    let mut i: u64 = 0;
    c.bench_function("striped_store_put", |b| {
        b.iter(|| {
            let key = i.to_le_bytes();
            store.put(black_box(&key), black_box(b"0123456789abcdef"));
            i += 1;
        })
    });
}

criterion_group!(
    benches,
    bench_shard_put_under_eviction_pressure,
    bench_shard_get_hit,
    bench_striped_store_put_across_shards
);
criterion_main!(benches);
