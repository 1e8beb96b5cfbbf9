use core::fmt;

use crate::error::Result;
use crate::index::MapOps;

cfg_if::cfg_if! {
    // SSE4.1 gives us all four candidate lanes in one multiply; the
    // generic path computes the identical indices with scalar wrapping
    // arithmetic, so the table layout never depends on the target.
    if #[cfg(all(
        target_feature = "sse4.1",
        any(target_arch = "x86", target_arch = "x86_64"),
        not(miri)
    ))] {
        mod simd;
        use simd as imp;
    } else {
        #[path = "generic.rs"]
        mod generic;
        use generic as imp;
    }
}

mod bitmap;
mod hash;
mod page;
mod table;

use self::table::{Pos, RawTable};

/// Multi-level cuckoo hash map over 64-bit keys and values.
///
/// Every bucket is one 128-byte cache line. A key has up to four candidate
/// pages; insertion displaces foreign entries toward their home pages, falls
/// back to a per-page overflow bucket, and doubles the page array when
/// displacement saturates.
pub struct MultiMap {
    table: RawTable,
}

impl MultiMap {
    pub fn new() -> Self {
        Self {
            table: RawTable::new(),
        }
    }

    /// Reserves an explicit number of pages (rounded up to a power of two).
    pub fn with_capacity(pages: usize) -> Self {
        Self {
            table: RawTable::with_capacity(pages),
        }
    }

    pub fn try_with_capacity(pages: usize) -> Result<Self> {
        Ok(Self {
            table: RawTable::try_with_capacity(pages)?,
        })
    }

    /// Insert-if-absent. Re-inserting a present key is a no-op; the first
    /// value written for a key wins.
    #[inline]
    pub fn insert(&mut self, key: u64, value: u64) {
        self.table.insert(key, value);
    }

    #[inline]
    pub fn find(&self, key: u64) -> Iter<'_> {
        Iter {
            table: &self.table,
            pos: self.table.lookup(key),
        }
    }

    #[inline]
    pub fn end(&self) -> Iter<'_> {
        Iter {
            table: &self.table,
            pos: Pos::End,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.table.num_pages()
    }

    /// Occupancy in per-mille, overflow pages included.
    #[inline]
    pub fn load_factor(&self) -> usize {
        self.table.load_factor()
    }

    /// Diagnostic: pages with foreign placements plus overflow residents.
    #[inline]
    pub fn overflow_rate(&self) -> usize {
        self.table.overflow_rate()
    }

    #[inline]
    pub fn overflow_pages(&self) -> usize {
        self.table.overflow_pages()
    }

    #[inline]
    pub fn overflow_entries(&self) -> usize {
        self.table.overflow_entries()
    }

    /// Doubles the page array and reinserts every entry under the new
    /// hash moduli. Also triggered implicitly by saturated inserts.
    pub fn rebuild(&mut self) {
        self.table.rebuild();
    }
}

impl Default for MultiMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapOps for MultiMap {
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
        MultiMap::len(self)
    }
}

/// Handle to a found slot, or the `end()` sentinel.
///
/// Compares by position only. Any mutation of the map invalidates
/// outstanding handles, which the borrow checker enforces.
pub struct Iter<'a> {
    table: &'a RawTable,
    pos: Pos,
}

impl<'a> Iter<'a> {
    /// The `(key, value)` this handle points at, or `None` at `end()`.
    #[inline]
    pub fn entry(&self) -> Option<(u64, u64)> {
        self.table.entry_at(self.pos).map(|e| (e.key, e.value))
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
