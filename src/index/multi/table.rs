use core::ptr;
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, realloc, Layout};

use crate::config::{
    CACHE_LINE, GROWTH_LIMIT_PAGES, INITIAL_PAGES, MAX_EVICTIONS, REBUILD_LOAD_FACTOR,
};
use crate::data::Entry;
use crate::error::{LineHashError, Result};
use crate::hint::{likely, unlikely};

use super::hash::{Hasher, MAX_LEVEL, NUM_LEVELS};
use super::page::{HashPage, PAGE_SLOTS};

/// Location of an entry inside the table, or the one-past-the-end sentinel.
///
/// Equality is positional; no pointer provenance is involved.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Pos {
    Slot { page: usize, slot: usize },
    Overflow { page: usize, slot: usize },
    End,
}

/// Rank of `page` within a key's ordered candidate tuple.
///
/// The first match is the canonical placement level; every counter update
/// in the table goes through it, so derived levels and bookkeeping always
/// agree, even when a tuple carries duplicate indices.
#[inline]
fn placement_rank(hashes: &[u32; NUM_LEVELS], page: u32) -> Option<usize> {
    hashes.iter().position(|&candidate| candidate == page)
}

/// The multi-level cuckoo table: a contiguous, cache-line-aligned array of
/// hash pages plus the hasher state and the entry/overflow counters.
pub(crate) struct RawTable {
    pages: NonNull<HashPage>,
    /// Page count, always a power of two
    capacity: usize,
    mask: u32,
    num_entries: usize,
    num_overflow_pages: usize,
    num_overflow_entries: usize,
    hasher: Hasher,
}

impl RawTable {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_PAGES)
    }

    pub fn with_capacity(pages: usize) -> Self {
        Self::try_with_capacity(pages).unwrap_or_else(|err| panic!("linehash: {}", err))
    }

    pub fn try_with_capacity(pages: usize) -> Result<Self> {
        let capacity = pages.max(INITIAL_PAGES).next_power_of_two();
        if capacity > GROWTH_LIMIT_PAGES {
            return Err(LineHashError::GrowthLimit { pages: capacity });
        }
        let layout = Self::layout_for(capacity)?;
        // A zeroed page is a valid empty page: clear bitmaps, zero counters,
        // and a null `Option<Box<_>>` overflow pointer.
        let ptr = unsafe { alloc_zeroed(layout) };
        let pages = NonNull::new(ptr as *mut HashPage).ok_or(LineHashError::Alloc {
            size: layout.size(),
        })?;
        Ok(Self {
            pages,
            capacity,
            mask: (capacity - 1) as u32,
            num_entries: 0,
            num_overflow_pages: 0,
            num_overflow_entries: 0,
            hasher: Hasher::new(),
        })
    }

    fn layout_for(pages: usize) -> Result<Layout> {
        let size = core::mem::size_of::<HashPage>()
            .checked_mul(pages)
            .ok_or(LineHashError::CapacityOverflow)?;
        Layout::from_size_align(size, CACHE_LINE).map_err(|_| LineHashError::CapacityOverflow)
    }

    fn current_layout(&self) -> Layout {
        Self::layout_for(self.capacity).unwrap_or_else(|_| unreachable!())
    }

    #[inline]
    fn page(&self, index: usize) -> &HashPage {
        debug_assert!(index < self.capacity);
        unsafe { &*self.pages.as_ptr().add(index) }
    }

    #[inline]
    fn page_mut(&mut self, index: usize) -> &mut HashPage {
        debug_assert!(index < self.capacity);
        unsafe { &mut *self.pages.as_ptr().add(index) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_entries
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.capacity
    }

    /// Capacity in entries, not pages.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity * PAGE_SLOTS
    }

    #[inline]
    pub fn overflow_pages(&self) -> usize {
        self.num_overflow_pages
    }

    #[inline]
    pub fn overflow_entries(&self) -> usize {
        self.num_overflow_entries
    }

    /// Occupancy in per-mille of the page array plus overflow pages.
    pub fn load_factor(&self) -> usize {
        self.num_entries * 1000 / PAGE_SLOTS / (self.capacity + self.num_overflow_pages)
    }

    /// Pages holding any nonzero foreign-placed counter, plus the entries
    /// that sit in overflow pages. Diagnostic only.
    pub fn overflow_rate(&self) -> usize {
        let mut pages = 0;
        for index in 0..self.capacity {
            if self.page(index).has_foreign_placed() {
                pages += 1;
            }
        }
        pages + self.num_overflow_entries
    }

    pub fn entry_at(&self, pos: Pos) -> Option<Entry> {
        match pos {
            Pos::Slot { page, slot } => Some(self.page(page).entry(slot)),
            Pos::Overflow { page, slot } => self.page(page).overflow().map(|o| o.entry(slot)),
            Pos::End => None,
        }
    }

    /// Searches the candidate pages in level order, pruning with the
    /// foreign-placed counters: nothing can live at level `i + 1` while the
    /// level-`i` counter of the level-`i` candidate is zero.
    pub fn lookup(&self, key: u64) -> Pos {
        let hashes = self.hasher.candidates(key, self.mask);
        self.lookup_with(key, &hashes)
    }

    fn lookup_with(&self, key: u64, hashes: &[u32; NUM_LEVELS]) -> Pos {
        for level in 0..NUM_LEVELS {
            let index = hashes[level] as usize;
            let page = self.page(index);
            if let Some(slot) = page.find(key) {
                return Pos::Slot { page: index, slot };
            }
            if let Some(overflow) = page.overflow() {
                if let Some(slot) = overflow.find(key) {
                    return Pos::Overflow { page: index, slot };
                }
            }
            if level < MAX_LEVEL && page.foreign_placed(level) == 0 {
                break;
            }
        }
        Pos::End
    }

    /// Insert-if-absent; a key that is already present keeps its first value.
    pub fn insert(&mut self, key: u64, value: u64) {
        let hashes = self.hasher.candidates(key, self.mask);
        if self.lookup_with(key, &hashes) != Pos::End {
            return;
        }
        self.insert_internal(Entry::new(key, value), hashes);
        self.num_entries += 1;
    }

    fn raise_foreign(&mut self, hashes: &[u32; NUM_LEVELS], level: usize) {
        for l in 0..level.min(MAX_LEVEL) {
            self.page_mut(hashes[l] as usize).raise_foreign_placed(l);
        }
    }

    fn lower_foreign(&mut self, hashes: &[u32; NUM_LEVELS], level: usize) {
        for l in 0..level.min(MAX_LEVEL) {
            self.page_mut(hashes[l] as usize).lower_foreign_placed(l);
        }
    }

    /// Places the entry into the lowest-level candidate page with a free
    /// slot and raises the home-page counters below the accepted level.
    fn try_insert(&mut self, entry: Entry, hashes: &[u32; NUM_LEVELS]) -> bool {
        for level in 0..NUM_LEVELS {
            let index = hashes[level] as usize;
            if self.page_mut(index).insert(entry, level > 0) {
                self.raise_foreign(hashes, level);
                return true;
            }
        }
        false
    }

    /// Most-foreign-first victim search across the candidate pages.
    ///
    /// Scans each candidate page (skipping the level the entry was just
    /// evicted from) for the occupied slot with the highest derived level
    /// strictly above the placement level being attempted. On a hit the
    /// incoming entry is swapped in, its counters are raised, and the
    /// victim's former level is returned.
    fn try_evict_foreign(
        &mut self,
        evicted: &mut Entry,
        skip: Option<usize>,
        hashes: &[u32; NUM_LEVELS],
    ) -> Option<usize> {
        for level in 0..NUM_LEVELS {
            if skip == Some(level) {
                continue;
            }
            let index = hashes[level] as usize;
            let mut best: Option<(usize, usize)> = None;
            for slot in 0..PAGE_SLOTS {
                let page = self.page(index);
                if !page.is_used(slot) || !page.is_foreign(slot) {
                    continue;
                }
                let victim_hashes = self.hasher.candidates(page.entry(slot).key, self.mask);
                if let Some(rank) = placement_rank(&victim_hashes, index as u32) {
                    if rank > level && best.map_or(true, |(_, best_rank)| rank > best_rank) {
                        best = Some((slot, rank));
                    }
                }
            }
            if let Some((slot, victim_rank)) = best {
                let incoming_level = placement_rank(hashes, index as u32).unwrap_or(level);
                let was_foreign =
                    self.page_mut(index)
                        .swap_slot(slot, evicted, incoming_level > 0);
                debug_assert!(was_foreign);
                self.raise_foreign(hashes, incoming_level);
                return Some(victim_rank);
            }
        }
        None
    }

    /// Rotation fallback on the home page when no higher-level victim
    /// exists. Returns the victim's former level.
    fn evict_any(
        &mut self,
        evicted: &mut Entry,
        hashes: &[u32; NUM_LEVELS],
        counter: usize,
    ) -> usize {
        let home = hashes[0] as usize;
        // The incoming entry lands at its home page: level 0, no counters.
        let was_foreign = self.page_mut(home).evict(evicted, false, counter);
        if was_foreign {
            let victim_hashes = self.hasher.candidates(evicted.key, self.mask);
            placement_rank(&victim_hashes, home as u32).unwrap_or(0)
        } else {
            0
        }
    }

    /// Last resort: the orphan goes to its home page's overflow bucket and
    /// counts as placed beyond the last level.
    fn try_insert_overflow(&mut self, entry: Entry, hashes: &[u32; NUM_LEVELS]) -> bool {
        let home = hashes[0] as usize;
        let created = unlikely(self.page(home).overflow().is_none());
        let inserted = self.page_mut(home).ensure_overflow().insert(entry, false);
        if created {
            self.num_overflow_pages += 1;
        }
        if inserted {
            self.num_overflow_entries += 1;
            self.raise_foreign(hashes, NUM_LEVELS);
        }
        inserted
    }

    /// Cuckoo insertion. The caller has already ruled out a duplicate.
    fn insert_internal(&mut self, entry: Entry, hashes: [u32; NUM_LEVELS]) {
        if likely(self.try_insert(entry, &hashes)) {
            return;
        }

        let mut evicted = entry;
        let mut hashes = hashes;
        let mut last_evicted: Option<usize> = None;
        loop {
            let mut count = 0;
            while count < MAX_EVICTIONS {
                let victim_level =
                    match self.try_evict_foreign(&mut evicted, last_evicted, &hashes) {
                        Some(level) => level,
                        None => self.evict_any(&mut evicted, &hashes, count),
                    };
                last_evicted = Some(victim_level);
                hashes = self.hasher.candidates(evicted.key, self.mask);
                self.lower_foreign(&hashes, victim_level);
                if self.try_insert(evicted, &hashes) {
                    return;
                }
                count += 1;
            }
            if self.try_insert_overflow(evicted, &hashes) {
                return;
            }
            self.rebuild_or_rehash();
            last_evicted = None;
            hashes = self.hasher.candidates(evicted.key, self.mask);
            if self.try_insert(evicted, &hashes) {
                return;
            }
        }
    }

    fn rebuild_or_rehash(&mut self) {
        if self.load_factor() > REBUILD_LOAD_FACTOR {
            self.rebuild();
        } else {
            self.rehash();
        }
    }

    // TODO: rehash in place without growing; until then every exhaustion
    // below the load threshold still doubles.
    fn rehash(&mut self) {
        self.rebuild();
    }

    /// Doubles the page array and migrates every entry to the new layout.
    ///
    /// Runs in three steps: a tag-or-drain scan that retags slots already on
    /// a candidate page and collects the rest (plus all overflow entries),
    /// counting kept placements into shadow counters for old home pages and
    /// live counters for new ones; a commit of the shadow counters; and a
    /// reinsertion of the drained entries through the normal cuckoo path.
    /// The commit precedes reinsertion so every counter decrement during the
    /// reinsertion is backed by a prior increment.
    pub fn rebuild(&mut self) {
        let old_capacity = self.capacity;
        let mut new_capacity = old_capacity * 2;
        while self.num_entries + self.num_overflow_entries >= new_capacity * PAGE_SLOTS {
            new_capacity *= 2;
        }
        if unlikely(new_capacity > GROWTH_LIMIT_PAGES) {
            panic!(
                "linehash: {}",
                LineHashError::GrowthLimit { pages: new_capacity }
            );
        }
        self.grow(old_capacity, new_capacity);

        for index in 0..old_capacity {
            self.page_mut(index).clear_foreign_placed();
        }

        let mut shadow = vec![[0u16; MAX_LEVEL]; old_capacity];
        let mut pending: Vec<Entry> = Vec::new();
        for index in 0..old_capacity {
            for slot in 0..PAGE_SLOTS {
                if !self.page(index).is_used(slot) {
                    continue;
                }
                let entry = self.page(index).entry(slot);
                let hashes = self.hasher.candidates(entry.key, self.mask);
                match placement_rank(&hashes, index as u32) {
                    Some(level) => {
                        self.page_mut(index).set_foreign(slot, level > 0);
                        for l in 0..level {
                            let home = hashes[l] as usize;
                            if home < old_capacity {
                                shadow[home][l] += 1;
                            } else {
                                self.page_mut(home).raise_foreign_placed(l);
                            }
                        }
                    }
                    None => {
                        self.page_mut(index).erase(slot);
                        pending.push(entry);
                    }
                }
            }
            if let Some(overflow) = self.page_mut(index).take_overflow() {
                self.num_overflow_entries -= overflow.len();
                for slot in 0..PAGE_SLOTS {
                    if overflow.is_used(slot) {
                        pending.push(overflow.entry(slot));
                    }
                }
                self.num_overflow_pages -= 1;
            }
        }

        for (index, counts) in shadow.iter().enumerate() {
            for (level, &count) in counts.iter().enumerate() {
                if count != 0 {
                    self.page_mut(index).add_foreign_placed(level, count);
                }
            }
        }

        for entry in pending {
            let hashes = self.hasher.candidates(entry.key, self.mask);
            self.insert_internal(entry, hashes);
        }
    }

    fn grow(&mut self, old_capacity: usize, new_capacity: usize) {
        let old_layout = self.current_layout();
        let new_layout = Self::layout_for(new_capacity)
            .unwrap_or_else(|err| panic!("linehash: {}", err));
        let ptr = unsafe {
            realloc(self.pages.as_ptr() as *mut u8, old_layout, new_layout.size())
        };
        if ptr.is_null() {
            handle_alloc_error(new_layout);
        }
        self.pages = unsafe { NonNull::new_unchecked(ptr as *mut HashPage) };
        unsafe {
            ptr::write_bytes(
                self.pages.as_ptr().add(old_capacity),
                0,
                new_capacity - old_capacity,
            );
        }
        self.capacity = new_capacity;
        self.mask = (new_capacity - 1) as u32;
    }
}

unsafe impl Send for RawTable {}
unsafe impl Sync for RawTable {}

impl Drop for RawTable {
    fn drop(&mut self) {
        unsafe {
            for index in 0..self.capacity {
                // Runs the page's own drop glue, releasing overflow boxes.
                ptr::drop_in_place(self.pages.as_ptr().add(index));
            }
            dealloc(self.pages.as_ptr() as *mut u8, self.current_layout());
        }
    }
}

#[cfg(test)]
impl RawTable {
    /// Recounts every placement from scratch and compares against the
    /// stored bitmaps and counters.
    fn check_invariants(&self) {
        let mut expected = vec![[0u32; MAX_LEVEL]; self.capacity];
        let mut slot_entries = 0;
        let mut overflow_entries = 0;
        for index in 0..self.capacity {
            let page = self.page(index);
            for slot in 0..PAGE_SLOTS {
                if !page.is_used(slot) {
                    continue;
                }
                let entry = page.entry(slot);
                let hashes = self.hasher.candidates(entry.key, self.mask);
                let rank = placement_rank(&hashes, index as u32)
                    .expect("occupied slot must hash to its page");
                assert_eq!(
                    page.is_foreign(slot),
                    rank > 0,
                    "foreign flag mismatch for key {} on page {}",
                    entry.key,
                    index
                );
                for level in 0..rank {
                    expected[hashes[level] as usize][level] += 1;
                }
                slot_entries += 1;
            }
            if let Some(overflow) = page.overflow() {
                for slot in 0..PAGE_SLOTS {
                    if !overflow.is_used(slot) {
                        continue;
                    }
                    let entry = overflow.entry(slot);
                    let hashes = self.hasher.candidates(entry.key, self.mask);
                    assert_eq!(
                        hashes[0] as usize, index,
                        "overflow entry {} is not on its home page",
                        entry.key
                    );
                    for level in 0..MAX_LEVEL {
                        expected[hashes[level] as usize][level] += 1;
                    }
                    overflow_entries += 1;
                }
            }
        }
        assert_eq!(self.num_entries, slot_entries + overflow_entries);
        assert_eq!(self.num_overflow_entries, overflow_entries);
        for index in 0..self.capacity {
            for level in 0..MAX_LEVEL {
                assert_eq!(
                    u32::from(self.page(index).foreign_placed(level)),
                    expected[index][level],
                    "foreign_placed mismatch on page {} level {}",
                    index,
                    level
                );
            }
        }
    }
}
