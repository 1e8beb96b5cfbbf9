use core::fmt;
use core::mem;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::config::{BTREE_LOAD_FACTOR, BTREE_MAX_INSERT_FAIL, GROWTH_LIMIT_PAGES};
use crate::data::Entry;
use crate::error::{LineHashError, Result};
use crate::index::MapOps;

mod page;

use self::page::{PageCell, PageView, PageViewMut, BUCKET_SLOTS};

// Keys are small integers; FxHash is the cheapest spread that holds up.
pub type DefaultHashBuilder = fxhash::FxBuildHasher;

#[inline]
fn make_hash(hash_builder: &impl BuildHasher, key: &u64) -> u64 {
    let mut state = hash_builder.build_hasher();
    key.hash(&mut state);
    state.finish()
}

/// Location of an entry inside the hashed B-tree, or the sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pos {
    Bucket { page: usize, slot: usize },
    Leaf { page: usize, child: usize, slot: usize },
    End,
}

/// Hash table whose buckets promote themselves to tiny B-trees.
///
/// Every cell is one 128-byte cache line holding up to seven entries as a
/// flat bucket; the first overflowing insert converts it in place into a
/// B-tree page with heap-allocated extents. When a page saturates, the
/// whole table doubles and migrates.
pub struct HashedBtree {
    cells: Vec<PageCell>,
    len: usize,
    hash_builder: DefaultHashBuilder,
}

impl HashedBtree {
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Reserves an explicit page count.
    pub fn with_capacity(pages: usize) -> Self {
        Self::try_with_capacity(pages).unwrap_or_else(|err| panic!("linehash: {}", err))
    }

    pub fn try_with_capacity(pages: usize) -> Result<Self> {
        let capacity = pages.max(1);
        if capacity > GROWTH_LIMIT_PAGES {
            return Err(LineHashError::GrowthLimit { pages: capacity });
        }
        let mut cells = Vec::with_capacity(capacity);
        cells.resize_with(capacity, PageCell::new_hash);
        Ok(Self {
            cells,
            len: 0,
            hash_builder: DefaultHashBuilder::default(),
        })
    }

    #[inline]
    fn page_index(&self, key: u64) -> usize {
        (make_hash(&self.hash_builder, &key) % self.cells.len() as u64) as usize
    }

    fn lookup(&self, key: u64) -> Pos {
        let index = self.page_index(key);
        match self.cells[index].view() {
            PageView::Hash(bucket) => match bucket.find(key) {
                Some(slot) => Pos::Bucket { page: index, slot },
                None => Pos::End,
            },
            PageView::Btree(btree) => match btree.find(key) {
                Some((child, slot)) => Pos::Leaf {
                    page: index,
                    child,
                    slot,
                },
                None => Pos::End,
            },
        }
    }

    fn entry_at(&self, pos: Pos) -> Option<Entry> {
        match pos {
            Pos::Bucket { page, slot } => match self.cells[page].view() {
                PageView::Hash(bucket) => Some(bucket.entry(slot)),
                PageView::Btree(_) => None,
            },
            Pos::Leaf { page, child, slot } => match self.cells[page].view() {
                PageView::Btree(btree) => Some(btree.entry(child, slot)),
                PageView::Hash(_) => None,
            },
            Pos::End => None,
        }
    }

    /// Insert-if-absent; the first value written for a key wins.
    pub fn insert(&mut self, key: u64, value: u64) {
        if self.lookup(key) != Pos::End {
            return;
        }
        if self.len * 1000 >= self.num_pages() * BUCKET_SLOTS * BTREE_LOAD_FACTOR {
            self.resize();
        }

        let entry = Entry::new(key, value);
        let mut fail_count = 0;
        while fail_count < BTREE_MAX_INSERT_FAIL {
            let index = self.page_index(key);
            let cell = &mut self.cells[index];
            if let PageViewMut::Hash(bucket) = cell.view_mut() {
                if bucket.insert(entry) {
                    self.len += 1;
                    return;
                }
                cell.promote();
            }
            if let PageViewMut::Btree(btree) = cell.view_mut() {
                if btree.insert(entry) {
                    self.len += 1;
                    return;
                }
            }
            self.resize();
            fail_count += 1;
        }
        panic!(
            "linehash: hashed btree page still saturated after {} resizes",
            BTREE_MAX_INSERT_FAIL
        );
    }

    #[inline]
    pub fn find(&self, key: u64) -> Iter<'_> {
        Iter {
            map: self,
            pos: self.lookup(key),
        }
    }

    #[inline]
    pub fn end(&self) -> Iter<'_> {
        Iter {
            map: self,
            pos: Pos::End,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.cells.len()
    }

    /// Capacity in entries at the flat-bucket rate; promoted pages hold
    /// more, so this is a floor.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_pages() * BUCKET_SLOTS
    }

    /// Occupancy in per-mille of the flat-bucket capacity.
    pub fn load_factor(&self) -> usize {
        self.len * 1000 / (self.num_pages() * BUCKET_SLOTS)
    }

    /// Doubles the page array and migrates every entry. Also triggered by
    /// the load factor and by saturated pages during insert.
    pub fn resize(&mut self) {
        let mut next = Self::with_capacity(self.num_pages() * 2);
        for cell in &self.cells {
            match cell.view() {
                PageView::Hash(bucket) => {
                    for slot in 0..bucket.len() {
                        let entry = bucket.entry(slot);
                        next.insert(entry.key, entry.value);
                    }
                }
                PageView::Btree(btree) => {
                    for child in 0..=btree.len_keys() {
                        for entry in btree.child_entries(child) {
                            next.insert(entry.key, entry.value);
                        }
                    }
                }
            }
        }
        mem::swap(self, &mut next);
    }
}

impl Default for HashedBtree {
    fn default() -> Self {
        Self::new()
    }
}

impl MapOps for HashedBtree {
    #[inline]
    fn put(&mut self, key: u64, value: u64) {
        self.insert(key, value);
    }
    #[inline]
    fn get(&self, key: u64) -> Option<u64> {
        self.find(key).entry().map(|(_, value)| value)
    }
    #[inline]
    fn len(&self) -> usize {
        HashedBtree::len(self)
    }
}

/// Handle to a found entry, or the `end()` sentinel. Positional equality.
pub struct Iter<'a> {
    map: &'a HashedBtree,
    pos: Pos,
}

impl<'a> Iter<'a> {
    /// The `(key, value)` this handle points at, or `None` at `end()`.
    #[inline]
    pub fn entry(&self) -> Option<(u64, u64)> {
        self.map.entry_at(self.pos).map(|e| (e.key, e.value))
    }

    /// Key under the handle. Panics when the handle is `end()`.
    #[inline]
    pub fn key(&self) -> u64 {
        self.entry().expect("dereferenced the end() sentinel").0
    }

    /// Value under the handle. Panics when the handle is `end()`.
    #[inline]
    pub fn value(&self) -> u64 {
        self.entry().expect("dereferenced the end() sentinel").1
    }
}

impl PartialEq for Iter<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

impl Eq for Iter<'_> {}

impl fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Iter").field(&self.pos).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_find() {
        let mut map = HashedBtree::new();
        map.insert(5, 1000);
        let iter = map.find(5);
        assert_ne!(iter, map.end());
        assert_eq!(iter.entry(), Some((5, 1000)));
        assert_eq!(map.find(1000), map.end());
    }

    #[test]
    fn duplicate_insert_keeps_first_value() {
        let mut map = HashedBtree::new();
        map.insert(3, 1);
        map.insert(3, 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(3), Some(1));
    }

    #[test]
    fn promotion_under_skew() {
        // Capacity one forces every key through a single cell until the
        // load factor starts doubling the table.
        let mut map = HashedBtree::new();
        for i in 1..=500u64 {
            map.insert(i, i + 1000);
        }
        assert_eq!(map.len(), 500);
        assert!(map.num_pages() > 1);
        for i in 1..=500u64 {
            assert_eq!(map.get(i), Some(i + 1000), "key {}", i);
        }
    }
}
