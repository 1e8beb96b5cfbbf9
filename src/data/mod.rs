use core::mem;

use crate::config::CACHE_LINE;

/// A key/value pair as stored in a page slot.
///
/// Slot occupancy is tracked by the page bitmaps, never by a sentinel key,
/// so `0` is an ordinary key.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Entry {
    pub key: u64,
    pub value: u64,
}

impl Entry {
    #[inline]
    pub fn new(key: u64, value: u64) -> Self {
        Self { key, value }
    }
}

// Eight entries per cache line; the page layouts depend on it.
const _: () = assert!(mem::size_of::<Entry>() == CACHE_LINE / 8);
