use core::mem;
use core::mem::ManuallyDrop;

use crate::config::CACHE_LINE;
use crate::data::Entry;

/// Entries a cell holds while still a flat hash bucket.
pub(crate) const BUCKET_SLOTS: usize = 7;
/// Separator keys per B-tree page.
pub(crate) const BTREE_KEYS: usize = 6;
/// Entries per extent.
pub(crate) const EXTENT_SLOTS: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PageKind {
    Hash,
    Btree,
}

/// One-byte page header: bit 0 is the page kind, bits 1..8 the size.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct PageTag(u8);

impl PageTag {
    fn new(kind: PageKind, len: usize) -> Self {
        let kind_bit = match kind {
            PageKind::Hash => 0,
            PageKind::Btree => 1,
        };
        debug_assert!(len < 128);
        Self(kind_bit | ((len as u8) << 1))
    }

    #[inline]
    pub fn kind(&self) -> PageKind {
        if self.0 & 1 == 0 {
            PageKind::Hash
        } else {
            PageKind::Btree
        }
    }

    #[inline]
    fn len(&self) -> usize {
        (self.0 >> 1) as usize
    }

    #[inline]
    fn set_len(&mut self, len: usize) {
        debug_assert!(len < 128);
        self.0 = (self.0 & 1) | ((len as u8) << 1);
    }
}

/// Flat bucket state of a cell: append-only entry array.
#[repr(C, align(128))]
pub(crate) struct HashBucket {
    tag: PageTag,
    _pad: [u8; 15],
    items: [Entry; BUCKET_SLOTS],
}

impl HashBucket {
    fn new() -> Self {
        Self {
            tag: PageTag::new(PageKind::Hash, 0),
            _pad: [0; 15],
            items: [Entry::default(); BUCKET_SLOTS],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tag.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= BUCKET_SLOTS
    }

    pub fn insert(&mut self, entry: Entry) -> bool {
        if self.is_full() {
            return false;
        }
        let len = self.len();
        self.items[len] = entry;
        self.tag.set_len(len + 1);
        true
    }

    pub fn find(&self, key: u64) -> Option<usize> {
        (0..self.len()).find(|&slot| self.items[slot].key == key)
    }

    #[inline]
    pub fn entry(&self, slot: usize) -> Entry {
        debug_assert!(slot < self.len());
        self.items[slot]
    }
}

/// Leaf storage of a B-tree page, heap-allocated one cache line at a time.
#[repr(C)]
pub(crate) struct Extent {
    items: [Entry; EXTENT_SLOTS],
}

impl Extent {
    fn new() -> Self {
        Self {
            items: [Entry::default(); EXTENT_SLOTS],
        }
    }

    pub fn find(&self, key: u64, len: usize) -> Option<usize> {
        (0..len).find(|&slot| self.items[slot].key == key)
    }

    #[inline]
    fn insert_at(&mut self, pos: usize, entry: Entry) {
        self.items[pos] = entry;
    }

    fn sort(&mut self, len: usize) {
        self.items[..len].sort_unstable_by_key(|entry| entry.key);
    }

    /// Moves the upper half of a sorted extent into `other`; returns how
    /// many entries moved.
    fn split_half(&mut self, other: &mut Extent, len: usize) -> usize {
        let moved = len / 2;
        for (to, from) in (len - moved..len).enumerate() {
            other.items[to] = self.items[from];
        }
        moved
    }
}

/// B-tree state of a cell: separator keys over owned extents.
#[repr(C, align(128))]
pub(crate) struct BtreePage {
    tag: PageTag,
    child_len: [u8; BTREE_KEYS + 1],
    children: [Option<Box<Extent>>; BTREE_KEYS + 1],
    keys: [u64; BTREE_KEYS],
    _pad: [u8; 16],
}

impl BtreePage {
    fn from_bucket(bucket: &HashBucket) -> Self {
        let mut extent = Box::new(Extent::new());
        for slot in 0..bucket.len() {
            extent.insert_at(slot, bucket.entry(slot));
        }
        let mut child_len = [0u8; BTREE_KEYS + 1];
        child_len[0] = bucket.len() as u8;
        let mut children: [Option<Box<Extent>>; BTREE_KEYS + 1] = Default::default();
        children[0] = Some(extent);
        Self {
            tag: PageTag::new(PageKind::Btree, 0),
            child_len,
            children,
            keys: [0; BTREE_KEYS],
            _pad: [0; 16],
        }
    }

    /// Number of separator keys; the page owns one child more.
    #[inline]
    pub fn len_keys(&self) -> usize {
        self.tag.len()
    }

    #[inline]
    fn is_child_full(&self, child: usize) -> bool {
        self.child_len[child] as usize >= EXTENT_SLOTS
    }

    #[inline]
    fn is_full_key(&self) -> bool {
        self.len_keys() >= BTREE_KEYS
    }

    /// Entries of child `child` as a slice.
    pub fn child_entries(&self, child: usize) -> &[Entry] {
        match self.children[child].as_ref() {
            Some(extent) => &extent.items[..self.child_len[child] as usize],
            None => &[],
        }
    }

    #[inline]
    pub fn entry(&self, child: usize, slot: usize) -> Entry {
        self.child_entries(child)[slot]
    }

    fn descend(&self, key: u64) -> usize {
        let mut child = 0;
        while child < self.len_keys() && key >= self.keys[child] {
            child += 1;
        }
        child
    }

    pub fn find(&self, key: u64) -> Option<(usize, usize)> {
        let child = self.descend(key);
        let extent = self.children[child].as_ref()?;
        extent
            .find(key, self.child_len[child] as usize)
            .map(|slot| (child, slot))
    }

    /// Splits the full child `target`: sort, move the upper half into a
    /// fresh extent, shift separators right, and publish the new separator.
    fn split_child(&mut self, target: usize) {
        let len = self.child_len[target] as usize;
        let mut fresh = Box::new(Extent::new());
        let moved = {
            let child = self.children[target]
                .as_mut()
                .expect("split target has no extent");
            child.sort(len);
            child.split_half(&mut fresh, len)
        };
        self.child_len[target] = (len - moved) as u8;

        let size = self.len_keys();
        let mut i = size;
        while i > target {
            self.keys[i] = self.keys[i - 1];
            self.children[i + 1] = self.children[i].take();
            self.child_len[i + 1] = self.child_len[i];
            i -= 1;
        }
        self.keys[target] = fresh.items[0].key;
        self.child_len[target + 1] = moved as u8;
        self.children[target + 1] = Some(fresh);
        self.tag.set_len(size + 1);
    }

    fn try_insert_at_child(&mut self, child: usize, entry: Entry) -> bool {
        if self.is_child_full(child) {
            if self.is_full_key() {
                return false;
            }
            self.split_child(child);
            if entry.key < self.keys[child] {
                self.try_insert_at_child(child, entry)
            } else {
                self.try_insert_at_child(child + 1, entry)
            }
        } else {
            let len = self.child_len[child] as usize;
            match self.children[child].as_mut() {
                Some(extent) => extent.insert_at(len, entry),
                None => {
                    let mut extent = Box::new(Extent::new());
                    extent.insert_at(len, entry);
                    self.children[child] = Some(extent);
                }
            }
            self.child_len[child] += 1;
            true
        }
    }

    /// Fails only when both the target child and the key array are full.
    pub fn insert(&mut self, entry: Entry) -> bool {
        let child = self.descend(entry.key);
        self.try_insert_at_child(child, entry)
    }
}

/// One 128-byte cell of the hashed B-tree: starts as a hash bucket and is
/// promoted in place to a B-tree page on its first overflow. The kind bit
/// in the shared one-byte header discriminates; all access goes through the
/// typed views.
#[repr(C)]
pub(crate) union PageCell {
    hash: ManuallyDrop<HashBucket>,
    btree: ManuallyDrop<BtreePage>,
}

pub(crate) enum PageView<'a> {
    Hash(&'a HashBucket),
    Btree(&'a BtreePage),
}

pub(crate) enum PageViewMut<'a> {
    Hash(&'a mut HashBucket),
    Btree(&'a mut BtreePage),
}

impl PageCell {
    pub fn new_hash() -> Self {
        PageCell {
            hash: ManuallyDrop::new(HashBucket::new()),
        }
    }

    #[inline]
    fn tag(&self) -> PageTag {
        // Both variants lay the tag at offset zero.
        unsafe { (*self.hash).tag }
    }

    #[inline]
    pub fn kind(&self) -> PageKind {
        self.tag().kind()
    }

    pub fn view(&self) -> PageView<'_> {
        match self.kind() {
            PageKind::Hash => PageView::Hash(unsafe { &*self.hash }),
            PageKind::Btree => PageView::Btree(unsafe { &*self.btree }),
        }
    }

    pub fn view_mut(&mut self) -> PageViewMut<'_> {
        match self.kind() {
            PageKind::Hash => PageViewMut::Hash(unsafe { &mut *self.hash }),
            PageKind::Btree => PageViewMut::Btree(unsafe { &mut *self.btree }),
        }
    }

    /// Typed state transition from bucket to B-tree page: the bucket's
    /// entries move into the first extent of the fresh page.
    pub fn promote(&mut self) {
        debug_assert_eq!(self.kind(), PageKind::Hash);
        let btree = BtreePage::from_bucket(unsafe { &*self.hash });
        // The bucket variant owns no heap memory; overwriting is enough.
        *self = PageCell {
            btree: ManuallyDrop::new(btree),
        };
    }
}

impl Drop for PageCell {
    fn drop(&mut self) {
        if self.kind() == PageKind::Btree {
            unsafe { ManuallyDrop::drop(&mut self.btree) }
        }
    }
}

const _: () = assert!(mem::size_of::<PageTag>() == 1);
const _: () = assert!(mem::size_of::<HashBucket>() == CACHE_LINE);
const _: () = assert!(mem::size_of::<BtreePage>() == CACHE_LINE);
const _: () = assert!(mem::size_of::<Extent>() == CACHE_LINE);
const _: () = assert!(mem::size_of::<PageCell>() == CACHE_LINE);
