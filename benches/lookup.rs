use criterion::{criterion_group, criterion_main, Bencher, Criterion, Throughput};
use once_cell::sync::Lazy;
use rand::Rng;

use linehash::{HashedBtree, MapOps, MultiMap};
use std::collections::HashMap;

const TOTAL_KEYS: u64 = 100_000;
const TOTAL_OPERATIONS: u64 = 10_000;

static RANDOM_INDEXES: Lazy<Vec<u64>> = Lazy::new(|| {
    let mut rng = rand::thread_rng();
    let mut indexes = Vec::with_capacity(TOTAL_OPERATIONS as usize);
    for _ in 0..TOTAL_OPERATIONS {
        indexes.push(rng.gen_range(1, TOTAL_KEYS + 1));
    }
    indexes
});

fn lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(TOTAL_OPERATIONS));

    group.bench_function("MultiMap random get", multi_random_get);
    group.bench_function("MultiMap random miss", multi_random_miss);
    group.bench_function("HashedBtree random get", btree_random_get);
    group.bench_function("HashMap random get", hashmap_random_get);

    group.finish();
}

fn multi_random_get(b: &mut Bencher) {
    let mut map = MultiMap::new();
    for i in 1..=TOTAL_KEYS {
        map.insert(i, 1000 + i);
    }
    b.iter(|| {
        for key in RANDOM_INDEXES.iter() {
            assert!(map.find(*key) != map.end());
        }
    });
}

fn multi_random_miss(b: &mut Bencher) {
    let mut map = MultiMap::new();
    for i in 1..=TOTAL_KEYS {
        map.insert(i, 1000 + i);
    }
    b.iter(|| {
        for key in RANDOM_INDEXES.iter() {
            assert!(map.find(key + TOTAL_KEYS) == map.end());
        }
    });
}

fn btree_random_get(b: &mut Bencher) {
    let mut map = HashedBtree::new();
    for i in 1..=TOTAL_KEYS {
        map.insert(i, 1000 + i);
    }
    b.iter(|| {
        for key in RANDOM_INDEXES.iter() {
            assert_eq!(map.get(*key).is_some(), true);
        }
    });
}

fn hashmap_random_get(b: &mut Bencher) {
    let mut map = HashMap::new();
    for i in 1..=TOTAL_KEYS {
        map.insert(i, 1000 + i);
    }
    b.iter(|| {
        for key in RANDOM_INDEXES.iter() {
            assert_eq!(map.get(key).is_some(), true);
        }
    });
}

criterion_group!(benches, lookup);
criterion_main!(benches);
