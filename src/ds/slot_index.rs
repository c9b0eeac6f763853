//! Deterministic key → (bucket, page slot, lock stripe) mapping.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Slot Selection Flow                            │
//! │                                                                         │
//! │   key: u64                                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   h = (i32)(key >> 32) XOR (i32)key                                     │
//! │       │                                                                 │
//! │       ├──► bucket = |h mod bucket_count|                                │
//! │       ├──► page   = |h mod rec_per_page|                                │
//! │       └──► lock   = bucket mod lock_count                               │
//! │                                                                         │
//! │   ┌─────────┬─────────┬─────────┬─────────┬─────────┐                  │
//! │   │ Bucket0 │ Bucket1 │ Bucket2 │ Bucket3 │ Bucket4 │  ...             │
//! │   └────┬────┴────┬────┴────┬────┴────┬────┴────┬────┘                  │
//! │        └─ lock 0 ┘─ lock 1 ┘─ lock 0 ┘─ lock 1 ┘─ lock 0                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Deterministic**: the same key always lands on the same bucket and page
//!   slot, which is what lets two distinct keys be detected as colliding.
//! - **Primary collision**: two keys sharing both bucket *and* page index.
//!   With coprime `bucket_count` and `rec_per_page`, keys below `2^31` collide
//!   exactly when they differ by a multiple of `bucket_count * rec_per_page`.
//! - **Lock stripe**: buckets share a fixed pool of locks by modulo indexing.
//!
//! ## Example Usage
//!
//! ```
//! use tablecache::ds::SlotIndexer;
//!
//! let indexer = SlotIndexer::new(11, 3, 4);
//! let a = indexer.locate(1);
//! let b = indexer.locate(1 + 11 * 3);
//!
//! assert_eq!((a.bucket, a.page), (b.bucket, b.page));
//! assert_eq!(a.lock, a.bucket % 4);
//! ```

/// Location of a key inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotIndex {
    /// Index into the bucket array.
    pub bucket: usize,
    /// Index into a collision page, should the bucket hold one.
    pub page: usize,
    /// Index of the stripe lock guarding the bucket.
    pub lock: usize,
}

/// Maps keys to slot locations for a table of fixed geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotIndexer {
    buckets: usize,
    rec_per_page: usize,
    locks: usize,
}

impl SlotIndexer {
    /// Creates an indexer for the given geometry. Each count is clamped to at
    /// least 1.
    pub fn new(buckets: usize, rec_per_page: usize, locks: usize) -> Self {
        Self {
            buckets: buckets.max(1),
            rec_per_page: rec_per_page.max(1),
            locks: locks.max(1),
        }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets
    }

    /// Number of slots per collision page.
    pub fn rec_per_page(&self) -> usize {
        self.rec_per_page
    }

    /// Number of lock stripes.
    pub fn lock_count(&self) -> usize {
        self.locks
    }

    /// Folds a key into the 32-bit hash used for every index.
    #[inline]
    pub fn fold(key: u64) -> i32 {
        ((key >> 32) as i32) ^ (key as i32)
    }

    /// Maps a key to its bucket, page slot and lock stripe.
    #[inline]
    pub fn locate(&self, key: u64) -> SlotIndex {
        let h = i64::from(Self::fold(key));
        let bucket = (h % self.buckets as i64).unsigned_abs() as usize;
        let page = (h % self.rec_per_page as i64).unsigned_abs() as usize;
        SlotIndex {
            bucket,
            page,
            lock: self.lock_for_bucket(bucket),
        }
    }

    /// Lock stripe owning a bucket.
    #[inline]
    pub fn lock_for_bucket(&self, bucket: usize) -> usize {
        bucket % self.locks
    }

    /// Page slot a key occupies inside a collision page.
    #[inline]
    pub fn page_slot(&self, key: u64) -> usize {
        (i64::from(Self::fold(key)) % self.rec_per_page as i64).unsigned_abs() as usize
    }
}
