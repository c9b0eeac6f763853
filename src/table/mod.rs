//! # Two-Level Hash Table
//!
//! A [`Table`] is a fixed-capacity hash structure of `u64`-keyed records. Each
//! bucket is empty, holds a single record, or, once two keys land in the same
//! bucket at different page indices, a fixed-size collision page.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────────┐
//!   │                            Table<V>                                   │
//!   │                                                                       │
//!   │   locks:   [ M0 | M1 | M2 | M3 ]        stripe = bucket % lock_count │
//!   │               │    │    │    │                                        │
//!   │   buckets: [ ∅ | S(r1) | P ─────────┐ | ∅ | S(r4) | ∅ | ... ]        │
//!   │                                     ▼                                 │
//!   │                       Page (rec_per_page slots, own lock)             │
//!   │                       [ r2 | ∅ | r3 ]                                 │
//!   │                                                                       │
//!   │   count: AtomicUsize      page_count: AtomicUsize                     │
//!   └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Put Flow (under the bucket's stripe lock)
//!
//! ```text
//!   bucket empty                       ──► new Single              Inserted
//!   Single, same key                   ──► reuse in place          Replaced
//!   Single, other key, same page slot  ──► priority decides        Overwritten | Rejected
//!   Single, other key, other page slot ──► promote to Page         Inserted
//!   Page (page lock taken after stripe) ──► same rules on the slot, never promotes
//! ```
//!
//! ## Concurrency
//!
//! - Mutations take exactly one stripe lock, plus the page lock when the bucket
//!   holds a page. The order is always stripe then page.
//! - [`Table::get`] takes no lock: an acquire load of the bucket, possibly an
//!   acquire load of the page slot, then a key check. Readers may see the
//!   generation just before or just after a concurrent put, never a torn one.
//! - [`Table::get_or_put`] runs its factory while holding the stripe lock, so
//!   unrelated keys sharing a stripe wait for each other during the factory.
//!
//! ## Example Usage
//!
//! ```
//! use tablecache::table::{PutPolicy, Table};
//! use tablecache::TableOptions;
//!
//! let table: Table<String> = Table::new("sessions", &TableOptions::default());
//!
//! assert!(table.put(1, "alice".to_string()).inserted());
//! assert!(!table.put(1, "bob".to_string()).inserted());
//! assert_eq!(*table.get(1).unwrap().value(), "bob");
//!
//! let policy = PutPolicy::default().with_max_age(30).with_priority(2);
//! table.put_with(2, "carol".to_string(), &policy);
//! assert_eq!(table.count(), 2);
//!
//! assert!(table.remove(1));
//! assert!(table.get(1).is_none());
//! ```

pub mod record;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::ds::{SlotIndex, SlotIndexer, next_prime};
use crate::error::{BoxError, CacheError, InvariantError};
use crate::metrics::counters::TableCounters;
use crate::metrics::snapshot::TableMetricsSnapshot;
use crate::metrics::traits::MetricsSnapshotProvider;
use crate::options::TableOptions;
use crate::traits::CacheValue;

pub use record::{Metadata, PutPolicy, Record};
use record::{Aging, dispose, unix_millis};

/// How a put resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The slot was empty; `count` grew by one.
    Inserted,
    /// A record with the same key was reused in place.
    Replaced,
    /// A different key held the slot with lower or equal priority and was dropped.
    Overwritten,
    /// A different key held the slot with higher priority; the table is unchanged.
    Rejected,
}

/// Result of [`Table::put_with`].
#[derive(Debug, Clone)]
pub struct PutResult<V> {
    pub outcome: PutOutcome,
    /// The record now occupying the slot. For [`PutOutcome::Rejected`] this is
    /// the surviving record of the other key.
    pub record: Arc<Record<V>>,
}

impl<V> PutResult<V> {
    /// True only when no record previously occupied the slot.
    pub fn inserted(&self) -> bool {
        self.outcome == PutOutcome::Inserted
    }
}

/// Outcome of placing a value, plus whatever must be disposed once the locks
/// are released.
struct Placement<V> {
    result: PutResult<V>,
    displaced: Option<Arc<V>>,
    rejected: Option<Arc<V>>,
}

enum Bucket<V> {
    Single(Arc<Record<V>>),
    Page(Arc<Page<V>>),
}

struct Page<V> {
    slots: Box<[ArcSwapOption<Record<V>>]>,
    occupied: AtomicUsize,
    lock: Mutex<()>,
}

impl<V> Page<V> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| ArcSwapOption::empty()).collect(),
            occupied: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }
}

/// Sweep totals for one pass over a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub buckets: usize,
    pub pages: usize,
    pub removed: usize,
}

impl SweepStats {
    fn merge(&mut self, other: SweepStats) {
        self.buckets += other.buckets;
        self.pages += other.pages;
        self.removed += other.removed;
    }
}

/// Buckets below this count are always swept on the calling thread.
const PARALLEL_SWEEP_MIN_BUCKETS: usize = 4_096;

/// Named, fixed-capacity two-level hash table.
pub struct Table<V> {
    name: String,
    indexer: SlotIndexer,
    buckets: Box<[ArcSwapOption<Bucket<V>>]>,
    locks: Box<[Mutex<()>]>,
    count: AtomicUsize,
    page_count: AtomicUsize,
    default_max_age_sec: u32,
    parallel_sweep: bool,
    counters: TableCounters,
}

impl<V> Table<V> {
    /// Creates a table. `bucket_count` and `rec_per_page` are rounded up to
    /// the next prime; a zero `lock_count` uses the processor-based default.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let options = TableOptions { bucket_count: 1_000, rec_per_page: 4, ..TableOptions::default() };
    /// let table: Table<u64> = Table::new("prices", &options);
    ///
    /// assert_eq!(table.bucket_count(), 1_009);
    /// assert_eq!(table.rec_per_page(), 5);
    /// assert!(table.is_empty());
    /// ```
    pub fn new(name: impl Into<String>, options: &TableOptions) -> Self {
        let bucket_count = next_prime(options.bucket_count);
        let rec_per_page = next_prime(options.rec_per_page);
        let lock_count = options.effective_lock_count().min(bucket_count);
        Self {
            name: name.into(),
            indexer: SlotIndexer::new(bucket_count, rec_per_page, lock_count),
            buckets: (0..bucket_count).map(|_| ArcSwapOption::empty()).collect(),
            locks: (0..lock_count).map(|_| Mutex::new(())).collect(),
            count: AtomicUsize::new(0),
            page_count: AtomicUsize::new(0),
            default_max_age_sec: options.max_age_sec,
            parallel_sweep: options.parallel_sweep,
            counters: TableCounters::default(),
        }
    }

    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// assert_eq!(table.name(), "prices");
    /// ```
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live records.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// table.put(1, 10);
    /// table.put(1, 11);
    /// table.put(2, 20);
    /// assert_eq!(table.count(), 2);
    /// ```
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Buckets currently promoted to a collision page.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let options = TableOptions { bucket_count: 11, rec_per_page: 3, ..TableOptions::default() };
    /// let table: Table<u64> = Table::new("prices", &options);
    ///
    /// // 1 and 12 share bucket 1 but not its page slot.
    /// table.put(1, 10);
    /// assert_eq!(table.page_count(), 0);
    /// table.put(12, 120);
    /// assert_eq!(table.page_count(), 1);
    ///
    /// table.remove(1);
    /// table.remove(12);
    /// assert_eq!(table.page_count(), 0);
    /// ```
    pub fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire)
    }

    pub fn bucket_count(&self) -> usize {
        self.indexer.bucket_count()
    }

    pub fn rec_per_page(&self) -> usize {
        self.indexer.rec_per_page()
    }

    pub fn lock_count(&self) -> usize {
        self.indexer.lock_count()
    }

    /// Maximum number of records: `bucket_count * rec_per_page`.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let options = TableOptions { bucket_count: 100, rec_per_page: 4, ..TableOptions::default() };
    /// let table: Table<u64> = Table::new("prices", &options);
    /// assert_eq!(table.capacity(), 101 * 5);
    /// ```
    pub fn capacity(&self) -> usize {
        self.bucket_count() * self.rec_per_page()
    }

    /// Lifetime applied to records whose policy leaves `max_age_sec` at 0.
    pub fn default_max_age_sec(&self) -> u32 {
        self.default_max_age_sec
    }

    /// Slot location of `key`.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let options = TableOptions { bucket_count: 11, rec_per_page: 3, lock_count: 4, ..TableOptions::default() };
    /// let table: Table<u64> = Table::new("prices", &options);
    ///
    /// let idx = table.locate(12);
    /// assert_eq!((idx.bucket, idx.page, idx.lock), (1, 0, 1));
    /// assert_eq!(table.locate(1).bucket, idx.bucket);
    /// ```
    pub fn locate(&self, key: u64) -> SlotIndex {
        self.indexer.locate(key)
    }

    pub(crate) fn counters(&self) -> &TableCounters {
        &self.counters
    }

    /// Looks up `key`. Lock-free.
    ///
    /// A hit bumps the record's hit count.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<String> = Table::new("sessions", &TableOptions::default());
    /// table.put(7, "alice".to_string());
    ///
    /// let record = table.get(7).unwrap();
    /// assert_eq!(record.key(), 7);
    /// assert_eq!(record.hit_count(), 1);
    /// assert!(table.get(8).is_none());
    /// ```
    pub fn get(&self, key: u64) -> Option<Arc<Record<V>>> {
        self.get_with_age(key, 0)
    }

    /// Looks up `key`, treating records older than `age_sec` as misses.
    ///
    /// Age is the value recorded by the last sweep; `age_sec == 0` disables
    /// the check.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// table.put(1, 10);
    ///
    /// // Not yet aged by a sweep.
    /// assert!(table.get_with_age(1, 5).is_some());
    /// ```
    pub fn get_with_age(&self, key: u64, age_sec: u32) -> Option<Arc<Record<V>>> {
        match self.lookup(key, age_sec) {
            Some(record) => {
                record.record_hit();
                self.counters.inc_hit();
                Some(record)
            },
            None => {
                self.counters.inc_miss();
                None
            },
        }
    }

    /// Uncounted lookup shared by the read paths.
    pub(crate) fn lookup(&self, key: u64, age_sec: u32) -> Option<Arc<Record<V>>> {
        let idx = self.indexer.locate(key);
        let bucket = self.buckets[idx.bucket].load();
        let record = match bucket.as_deref()? {
            Bucket::Single(record) => Arc::clone(record),
            Bucket::Page(page) => page.slots[idx.page].load_full()?,
        };
        if record.key() != key {
            return None;
        }
        if age_sec > 0 && record.age_sec() > age_sec {
            return None;
        }
        Some(record)
    }

    /// Places a new value. Caller holds the stripe lock for `idx`.
    fn place(&self, key: u64, idx: SlotIndex, value: Arc<V>, policy: &PutPolicy) -> Placement<V> {
        let slot = &self.buckets[idx.bucket];
        let current = slot.load_full();
        match current.as_deref() {
            None => {
                let record = Arc::new(Record::new(key, value, policy));
                slot.store(Some(Arc::new(Bucket::Single(Arc::clone(&record)))));
                self.count.fetch_add(1, Ordering::AcqRel);
                self.counters.inc_insert();
                Placement::settled(PutOutcome::Inserted, record, None)
            },
            Some(Bucket::Single(existing)) if existing.key() == key => {
                self.reuse(existing, value, policy)
            },
            Some(Bucket::Single(existing)) => {
                let existing_page = self.indexer.page_slot(existing.key());
                if existing_page == idx.page {
                    return self.collide(existing, key, value, policy, |record| {
                        slot.store(Some(Arc::new(Bucket::Single(record))));
                    });
                }
                let page = Page::new(self.indexer.rec_per_page());
                let record = Arc::new(Record::new(key, value, policy));
                page.slots[existing_page].store(Some(Arc::clone(existing)));
                page.slots[idx.page].store(Some(Arc::clone(&record)));
                page.occupied.store(2, Ordering::Release);
                slot.store(Some(Arc::new(Bucket::Page(Arc::new(page)))));
                self.count.fetch_add(1, Ordering::AcqRel);
                self.page_count.fetch_add(1, Ordering::AcqRel);
                self.counters.inc_insert();
                self.counters.inc_page_create();
                Placement::settled(PutOutcome::Inserted, record, None)
            },
            Some(Bucket::Page(page)) => {
                let _page_guard = page.lock.lock();
                let page_slot = &page.slots[idx.page];
                match page_slot.load_full() {
                    None => {
                        let record = Arc::new(Record::new(key, value, policy));
                        page_slot.store(Some(Arc::clone(&record)));
                        page.occupied.fetch_add(1, Ordering::AcqRel);
                        self.count.fetch_add(1, Ordering::AcqRel);
                        self.counters.inc_insert();
                        Placement::settled(PutOutcome::Inserted, record, None)
                    },
                    Some(existing) if existing.key() == key => self.reuse(&existing, value, policy),
                    Some(existing) => self.collide(&existing, key, value, policy, |record| {
                        page_slot.store(Some(record));
                    }),
                }
            },
        }
    }

    fn reuse(&self, existing: &Arc<Record<V>>, value: Arc<V>, policy: &PutPolicy) -> Placement<V> {
        let displaced = existing.reuse(value, policy);
        self.counters.inc_replace();
        Placement::settled(PutOutcome::Replaced, Arc::clone(existing), Some(displaced))
    }

    /// Resolves a primary collision by priority; ties go to the incoming record.
    fn collide(
        &self,
        existing: &Arc<Record<V>>,
        key: u64,
        value: Arc<V>,
        policy: &PutPolicy,
        publish: impl FnOnce(Arc<Record<V>>),
    ) -> Placement<V> {
        if existing.priority() > policy.priority {
            self.counters.inc_priority_prevented();
            return Placement {
                result: PutResult {
                    outcome: PutOutcome::Rejected,
                    record: Arc::clone(existing),
                },
                displaced: None,
                rejected: Some(value),
            };
        }
        let record = Arc::new(Record::new(key, value, policy));
        publish(Arc::clone(&record));
        self.counters.inc_collision();
        Placement::settled(PutOutcome::Overwritten, record, Some(existing.value()))
    }

    /// Removes the record for `key` if `accept` agrees, under the stripe and
    /// page locks. Returns the removed record; its value is not yet disposed.
    fn remove_if(
        &self,
        key: u64,
        accept: impl FnOnce(&Arc<Record<V>>) -> bool,
    ) -> Option<Arc<Record<V>>> {
        let idx = self.indexer.locate(key);
        let _stripe = self.locks[idx.lock].lock();
        let slot = &self.buckets[idx.bucket];
        let current = slot.load_full()?;
        match &*current {
            Bucket::Single(record) => {
                if record.key() != key || !accept(record) {
                    return None;
                }
                slot.store(None);
                self.count.fetch_sub(1, Ordering::AcqRel);
                Some(Arc::clone(record))
            },
            Bucket::Page(page) => {
                let _page_guard = page.lock.lock();
                let page_slot = &page.slots[idx.page];
                let record = page_slot.load_full()?;
                if record.key() != key || !accept(&record) {
                    return None;
                }
                page_slot.store(None);
                if page.occupied.fetch_sub(1, Ordering::AcqRel) == 1 {
                    slot.store(None);
                    self.page_count.fetch_sub(1, Ordering::AcqRel);
                    self.counters.inc_page_remove();
                }
                self.count.fetch_sub(1, Ordering::AcqRel);
                Some(record)
            },
        }
    }

    /// Scans every bucket and page and verifies the counters and placement.
    ///
    /// Only meaningful while no other thread mutates the table.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// for key in 0..100 {
    ///     table.put(key, key);
    /// }
    /// table.check_invariants().unwrap();
    /// ```
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut records = 0usize;
        let mut pages = 0usize;
        for (b, bucket) in self.buckets.iter().enumerate() {
            let guard = bucket.load();
            match guard.as_deref() {
                None => {},
                Some(Bucket::Single(record)) => {
                    records += 1;
                    self.check_placement(record, b, None)?;
                },
                Some(Bucket::Page(page)) => {
                    pages += 1;
                    let mut occupied = 0usize;
                    for (p, page_slot) in page.slots.iter().enumerate() {
                        if let Some(record) = page_slot.load_full() {
                            occupied += 1;
                            self.check_placement(&record, b, Some(p))?;
                        }
                    }
                    if occupied == 0 {
                        return Err(InvariantError::new(format!(
                            "bucket {b} holds an empty page"
                        )));
                    }
                    let tracked = page.occupied.load(Ordering::Acquire);
                    if tracked != occupied {
                        return Err(InvariantError::new(format!(
                            "page in bucket {b} tracks {tracked} records but holds {occupied}"
                        )));
                    }
                    records += occupied;
                },
            }
        }
        if records != self.count() {
            return Err(InvariantError::new(format!(
                "count is {} but {records} slots are occupied",
                self.count()
            )));
        }
        if pages != self.page_count() {
            return Err(InvariantError::new(format!(
                "page_count is {} but {pages} buckets hold pages",
                self.page_count()
            )));
        }
        Ok(())
    }

    fn check_placement(
        &self,
        record: &Record<V>,
        bucket: usize,
        page: Option<usize>,
    ) -> Result<(), InvariantError> {
        let idx = self.indexer.locate(record.key());
        if idx.bucket != bucket || page.is_some_and(|p| p != idx.page) {
            return Err(InvariantError::new(format!(
                "key {} found at bucket {bucket} page {page:?}, expected {idx:?}",
                record.key()
            )));
        }
        Ok(())
    }

    /// Current counters (running totals) and gauges.
    ///
    /// Counters stay at zero when the `metrics` feature is disabled.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// table.put(1, 10);
    ///
    /// let metrics = table.metrics();
    /// assert_eq!(metrics.table, "prices");
    /// assert_eq!(metrics.record_count, 1);
    /// ```
    pub fn metrics(&self) -> TableMetricsSnapshot {
        self.gauges(String::new(), self.counters.peek())
    }

    /// Snapshot whose counters are reset afterwards; used when publishing.
    pub(crate) fn take_metrics(&self, store: &str) -> TableMetricsSnapshot {
        self.gauges(store.to_string(), self.counters.take())
    }

    fn gauges(
        &self,
        store: String,
        counters: crate::metrics::counters::CounterValues,
    ) -> TableMetricsSnapshot {
        TableMetricsSnapshot {
            store,
            table: self.name.clone(),
            counters,
            record_count: self.count(),
            page_count: self.page_count(),
            bucket_count: self.bucket_count(),
            capacity: self.capacity(),
        }
    }
}

impl<V: CacheValue> Table<V> {
    /// Stores `value` under `key` with the default policy.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// assert!(table.put(1, 10).inserted());
    /// assert!(!table.put(1, 11).inserted());
    /// assert_eq!(*table.get(1).unwrap().value(), 11);
    /// ```
    pub fn put(&self, key: u64, value: V) -> PutResult<V> {
        self.put_with(key, value, &PutPolicy::default())
    }

    /// Stores `value` under `key`.
    ///
    /// `inserted()` on the result is true only when the slot was empty; an
    /// in-place replace or a collision overwrite reports false.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{PutOutcome, PutPolicy, Table, TableOptions};
    ///
    /// let options = TableOptions { bucket_count: 11, rec_per_page: 3, ..TableOptions::default() };
    /// let table: Table<&str> = Table::new("prices", &options);
    ///
    /// // 1 and 34 share both bucket and page slot.
    /// table.put_with(1, "pinned", &PutPolicy::default().with_priority(5));
    /// let result = table.put_with(34, "newer", &PutPolicy::default());
    ///
    /// assert_eq!(result.outcome, PutOutcome::Rejected);
    /// assert_eq!(result.record.key(), 1);
    /// assert!(table.get(34).is_none());
    /// ```
    pub fn put_with(&self, key: u64, value: V, policy: &PutPolicy) -> PutResult<V> {
        let idx = self.indexer.locate(key);
        let placement = {
            let _stripe = self.locks[idx.lock].lock();
            self.place(key, idx, Arc::new(value), policy)
        };
        placement.finish(key)
    }

    /// Stores `value` under `key` unless a record for `key` exists and
    /// `taken` says it belongs to someone else. The check and the store run
    /// under one stripe lock. A refused value is handed back.
    pub(crate) fn put_unless_taken(
        &self,
        key: u64,
        value: V,
        policy: &PutPolicy,
        taken: impl FnOnce(&Record<V>) -> bool,
    ) -> Result<PutResult<V>, V> {
        let idx = self.indexer.locate(key);
        let placement = {
            let _stripe = self.locks[idx.lock].lock();
            if self.lookup(key, 0).is_some_and(|existing| taken(&existing)) {
                return Err(value);
            }
            self.place(key, idx, Arc::new(value), policy)
        };
        Ok(placement.finish(key))
    }

    /// Removes `key`, disposing its value. Returns false when absent.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("prices", &TableOptions::default());
    /// table.put(1, 10);
    /// assert!(table.remove(1));
    /// assert!(!table.remove(1));
    /// ```
    pub fn remove(&self, key: u64) -> bool {
        self.remove_where(key, |_| true)
    }

    /// Removes `key` only if `accept` holds for the record found under the lock.
    pub(crate) fn remove_where(&self, key: u64, accept: impl FnOnce(&Record<V>) -> bool) -> bool {
        match self.remove_if(key, |record| accept(&**record)) {
            Some(record) => {
                record.dispose_value();
                true
            },
            None => false,
        }
    }

    /// Returns the record for `key`, creating it with `factory` on a miss.
    ///
    /// The factory runs under the key's stripe lock after a second lookup, so
    /// concurrent callers racing on the same absent key invoke it once. A
    /// factory error is returned as [`CacheError::Factory`] and nothing is
    /// stored. Should a higher-priority colliding record keep the slot, the
    /// produced value is returned in a record that is not stored in the table.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::error::BoxError;
    /// use tablecache::{PutPolicy, Table, TableOptions};
    ///
    /// let table: Table<String> = Table::new("users", &TableOptions::default());
    /// let policy = PutPolicy::default();
    ///
    /// let loaded = table.get_or_put(3, || Ok::<_, BoxError>("ada".to_string()), 0, &policy)?;
    /// assert_eq!(*loaded.value(), "ada");
    ///
    /// // Present now: the factory is not called again.
    /// let cached = table.get_or_put(3, || Err::<String, BoxError>("unreachable".into()), 0, &policy)?;
    /// assert_eq!(*cached.value(), "ada");
    /// # Ok::<(), tablecache::CacheError>(())
    /// ```
    pub fn get_or_put<F, E>(
        &self,
        key: u64,
        factory: F,
        age_sec: u32,
        policy: &PutPolicy,
    ) -> Result<Arc<Record<V>>, CacheError>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxError>,
    {
        if let Some(record) = self.get_with_age(key, age_sec) {
            return Ok(record);
        }
        let idx = self.indexer.locate(key);
        let placement = {
            let _stripe = self.locks[idx.lock].lock();
            if let Some(record) = self.lookup(key, age_sec) {
                record.record_hit();
                self.counters.inc_hit();
                return Ok(record);
            }
            let value = factory().map_err(|source| CacheError::Factory {
                table: self.name.clone(),
                key,
                source: source.into(),
            })?;
            self.place(key, idx, Arc::new(value), policy)
        };
        if let Some(value) = &placement.rejected {
            let detached = Arc::new(Record::new(key, Arc::clone(value), policy));
            placement.finish(key);
            return Ok(detached);
        }
        Ok(placement.finish(key).record)
    }

    /// Ages every record and removes the expired ones.
    ///
    /// Stops early once `running` is cleared.
    pub(crate) fn sweep(&self, now: SystemTime, running: &AtomicBool) -> SweepStats {
        let now_ms = unix_millis(now);
        let buckets = self.buckets.len();
        if !self.parallel_sweep || buckets < PARALLEL_SWEEP_MIN_BUCKETS {
            return self.sweep_range(0, buckets, now_ms, running);
        }
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(1);
        let chunk = buckets.div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..buckets)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(buckets);
                    scope.spawn(move || self.sweep_range(start, end, now_ms, running))
                })
                .collect();
            let mut stats = SweepStats::default();
            for handle in handles {
                match handle.join() {
                    Ok(part) => stats.merge(part),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            stats
        })
    }

    fn sweep_range(&self, start: usize, end: usize, now_ms: i64, running: &AtomicBool) -> SweepStats {
        let mut stats = SweepStats::default();
        for b in start..end {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            stats.buckets += 1;
            let Some(bucket) = self.buckets[b].load_full() else {
                continue;
            };
            match &*bucket {
                Bucket::Single(record) => {
                    stats.removed += usize::from(self.sweep_record(record, now_ms));
                },
                Bucket::Page(page) => {
                    stats.pages += 1;
                    self.counters.inc_sweep_page();
                    for page_slot in page.slots.iter() {
                        if let Some(record) = page_slot.load_full() {
                            stats.removed += usize::from(self.sweep_record(&record, now_ms));
                        }
                    }
                },
            }
        }
        stats
    }

    fn sweep_record(&self, record: &Arc<Record<V>>, now_ms: i64) -> bool {
        if record.age(now_ms, self.default_max_age_sec) != Aging::Expired {
            return false;
        }
        let default_max_age = self.default_max_age_sec;
        let removed = self.remove_if(record.key(), |current| {
            Arc::ptr_eq(current, record) && current.is_expired(now_ms, default_max_age)
        });
        match removed {
            Some(removed) => {
                self.counters.inc_sweep_remove();
                removed.dispose_value();
                true
            },
            None => false,
        }
    }
}

impl<V: CacheValue> Placement<V> {
    /// Disposes displaced values (outside any lock) and yields the result.
    fn finish(self, key: u64) -> PutResult<V> {
        if let Some(displaced) = &self.displaced {
            dispose(key, displaced.as_ref());
        }
        self.result
    }
}

impl<V> Placement<V> {
    fn settled(outcome: PutOutcome, record: Arc<Record<V>>, displaced: Option<Arc<V>>) -> Self {
        Self {
            result: PutResult { outcome, record },
            displaced,
            rejected: None,
        }
    }
}

impl<V> MetricsSnapshotProvider<TableMetricsSnapshot> for Table<V> {
    fn snapshot(&self) -> TableMetricsSnapshot {
        self.metrics()
    }
}

impl<V> fmt::Debug for Table<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("count", &self.count())
            .field("page_count", &self.page_count())
            .field("bucket_count", &self.bucket_count())
            .field("rec_per_page", &self.rec_per_page())
            .field("lock_count", &self.lock_count())
            .finish_non_exhaustive()
    }
}
