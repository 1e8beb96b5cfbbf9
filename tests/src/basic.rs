use linehash::MultiMap;

#[test]
fn simple_insert_and_find() {
    let mut m = MultiMap::new();
    m.insert(5, 1000);

    let iter = m.find(5);
    assert_ne!(m.end(), iter);
    assert_eq!(5, iter.key());
    assert_eq!(1000, iter.value());

    assert_eq!(m.end(), m.find(1000));
}

#[test]
fn small_sequence_survives_growth() {
    let mut m = MultiMap::new();

    for i in 1..10u64 {
        m.insert(i, 1000 + i);
    }

    for i in 1..10u64 {
        let iter = m.find(i);
        assert_ne!(m.end(), iter, "{}-th element", i);
        assert_eq!(i, iter.key());
        assert_eq!(1000 + i, iter.value());
    }
}

#[test]
fn idempotent_insert() {
    let mut m = MultiMap::new();
    m.insert(42, 7);
    assert_eq!(m.len(), 1);
    m.insert(42, 7);
    assert_eq!(m.len(), 1);
    // First write wins: a later value for the same key is ignored.
    m.insert(42, 1234);
    assert_eq!(m.len(), 1);
    assert_eq!(m.find(42).value(), 7);
}

#[test]
fn explicit_rebuild_keeps_entries() {
    let mut m = MultiMap::new();
    for i in 1..=100u64 {
        m.insert(i, 1000 + i);
    }
    let len = m.len();
    let pages = m.num_pages();

    m.rebuild();

    assert_eq!(m.len(), len);
    assert!(m.num_pages() > pages);
    for i in 1..=100u64 {
        let iter = m.find(i);
        assert_ne!(m.end(), iter, "{}-th element", i);
        assert_eq!(1000 + i, iter.value());
    }
}

#[test]
fn mega_insert() {
    let mut m = MultiMap::new();

    for i in 1..1_000_000u64 {
        m.insert(i, 1000 + i);
    }
    assert_eq!(m.len(), 999_999);

    for i in 1..1_000_000u64 {
        let iter = m.find(i);
        assert_ne!(m.end(), iter, "{}-th element", i);
        assert_eq!(i, iter.key());
        assert_eq!(1000 + i, iter.value());
    }
    assert_eq!(m.end(), m.find(0));
}

#[test]
fn reserved_capacity() {
    let m = MultiMap::with_capacity(4096);
    assert_eq!(m.num_pages(), 4096);
    assert!(m.capacity() >= 4096);
    assert!(m.is_empty());
}

#[test]
fn diagnostics_are_consistent() {
    let mut m = MultiMap::new();
    for i in 1..=100_000u64 {
        m.insert(i, i);
    }
    assert!(m.load_factor() > 0);
    assert!(m.load_factor() <= 1000);
    // Everything that is not on a primary page sits in an overflow page.
    assert!(m.overflow_entries() <= m.len());
    if m.overflow_entries() == 0 {
        assert_eq!(m.overflow_pages(), 0);
    }
    assert!(m.num_pages().is_power_of_two());
}

#[test]
fn zero_key_round_trips() {
    let mut m = MultiMap::new();
    m.insert(0, 99);
    assert_ne!(m.end(), m.find(0));
    assert_eq!(m.find(0).value(), 99);
}
