use linehash::{HashedBtree, MapOps};

#[test]
fn simple_insert_and_find() {
    let mut m = HashedBtree::new();
    m.insert(5, 1000);

    let iter = m.find(5);
    assert_ne!(m.end(), iter);
    assert_eq!(5, iter.key());
    assert_eq!(1000, iter.value());

    assert_eq!(m.end(), m.find(1000));
}

#[test]
fn explicit_resize_keeps_entries() {
    let mut m = HashedBtree::new();
    for i in 1..20u64 {
        m.insert(i, 1000 + i);
    }
    m.resize();
    for i in 1..20u64 {
        let iter = m.find(i);
        assert_ne!(m.end(), iter, "{}", i);
        assert_eq!(i, iter.key());
        assert_eq!(1000 + i, iter.value());
    }
}

#[test]
fn mega_insert() {
    let mut m = HashedBtree::new();

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
}

#[test]
fn idempotent_insert() {
    let mut m = HashedBtree::new();
    m.insert(9, 1);
    m.insert(9, 2);
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(9), Some(1));
}

#[test]
fn page_count_doubles() {
    let mut m = HashedBtree::new();
    assert_eq!(m.num_pages(), 1);
    for i in 1..=10_000u64 {
        m.insert(i, i);
    }
    assert!(m.num_pages() > 1);
    assert!(m.load_factor() <= 1000);
}
