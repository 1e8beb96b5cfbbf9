use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use linehash::MultiMap;

/// Cross-check against a reference map with the same first-write-wins
/// semantics, duplicates included.
#[test]
fn random_insert_matches_reference() {
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let mut m = MultiMap::new();
    let mut reference: HashMap<u64, u64> = HashMap::new();

    for _ in 0..1_000_000 {
        let key = rng.gen::<u64>();
        let value = rng.gen::<u64>();
        m.insert(key, value);
        reference.entry(key).or_insert(value);
    }

    assert_eq!(m.len(), reference.len());
    for (key, value) in reference.iter() {
        let iter = m.find(*key);
        assert_ne!(m.end(), iter, "key {}", key);
        assert_eq!(*value, iter.value(), "key {}", key);
    }
}

/// Keys drawn from a narrow range produce heavy duplication; the map must
/// stay in lockstep with the reference.
#[test]
fn duplicate_heavy_workload() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut m = MultiMap::new();
    let mut reference: HashMap<u64, u64> = HashMap::new();

    for _ in 0..200_000 {
        let key = rng.gen_range(0, 20_000);
        let value = rng.gen::<u64>();
        m.insert(key, value);
        reference.entry(key).or_insert(value);
    }

    assert_eq!(m.len(), reference.len());
    for (key, value) in reference.iter() {
        assert_eq!(m.find(*key).value(), *value, "key {}", key);
    }
    for key in 20_000..21_000u64 {
        assert_eq!(m.end(), m.find(key), "key {}", key);
    }
}

/// Keys that differ only in their high 32 bits share all four candidate
/// pages; correctness must not depend on the high half.
#[test]
fn high_bit_collisions() {
    let mut m = MultiMap::new();
    let mut reference: HashMap<u64, u64> = HashMap::new();

    for low in 0..2_000u64 {
        for high in 0..4u64 {
            let key = (high << 32) | low;
            m.insert(key, key ^ 0xabcd);
            reference.insert(key, key ^ 0xabcd);
        }
    }

    assert_eq!(m.len(), reference.len());
    for (key, value) in reference.iter() {
        assert_eq!(m.find(*key).value(), *value, "key {:#x}", key);
    }
}
