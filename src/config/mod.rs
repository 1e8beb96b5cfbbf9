/// Size of one page in bytes.
///
/// Every bucket structure in the crate is laid out to occupy exactly one
/// cache line; the page types carry compile-time size asserts against this
/// constant.
pub const CACHE_LINE: usize = 128;

/// Default number of pages a fresh table allocates.
pub const INITIAL_PAGES: usize = 2;

/// Upper bound on cuckoo displacement rounds before the insert falls back
/// to the home page's overflow bucket.
pub const MAX_EVICTIONS: usize = 5;

/// Load factor (per-mille) above which an exhausted insert grows the table
/// instead of rehashing in place.
pub const REBUILD_LOAD_FACTOR: usize = 700;

/// Hard ceiling on the page count. Growing past this aborts the process
/// rather than letting a pathological workload double forever.
pub const GROWTH_LIMIT_PAGES: usize = 50_000_000;

/// Load factor (per-mille) at which the hashed B-tree engine doubles.
pub const BTREE_LOAD_FACTOR: usize = 900;

/// Resize attempts a single hashed B-tree insert may consume.
pub const BTREE_MAX_INSERT_FAIL: usize = 5;
