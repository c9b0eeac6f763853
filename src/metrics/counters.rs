//! Atomic counters recorded on the hot path.
//!
//! Every counter is a relaxed `AtomicU64`: counters are observational and do
//! not order any cache state. Table counters sit on the read and write paths
//! and compile away without the `metrics` feature; store counters tick once
//! per cycle and are always kept. Publishing uses [`TableCounters::take`], which
//! swaps each counter with zero so the exported values are deltas since the
//! previous publish.

use std::sync::atomic::{AtomicU64, Ordering};

/// Plain copy of the counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub hits: u64,
    pub misses: u64,
    pub complex_hits: u64,
    pub complex_misses: u64,
    pub inserts: u64,
    pub replaces: u64,
    pub collisions: u64,
    pub priority_prevented_collisions: u64,
    pub page_creates: u64,
    pub page_removes: u64,
    pub sweep_pages: u64,
    pub sweep_removes: u64,
}

impl CounterValues {
    /// Adds `other` into `self`.
    pub fn accumulate(&mut self, other: &CounterValues) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.complex_hits += other.complex_hits;
        self.complex_misses += other.complex_misses;
        self.inserts += other.inserts;
        self.replaces += other.replaces;
        self.collisions += other.collisions;
        self.priority_prevented_collisions += other.priority_prevented_collisions;
        self.page_creates += other.page_creates;
        self.page_removes += other.page_removes;
        self.sweep_pages += other.sweep_pages;
        self.sweep_removes += other.sweep_removes;
    }
}

/// Per-table delta counters.
///
/// Without the `metrics` feature the struct is empty, every `inc_*` compiles
/// to nothing and reads return zeros.
#[derive(Debug, Default)]
pub struct TableCounters {
    #[cfg(feature = "metrics")]
    cells: TableCells,
}

#[cfg(feature = "metrics")]
#[derive(Debug, Default)]
struct TableCells {
    hits: AtomicU64,
    misses: AtomicU64,
    complex_hits: AtomicU64,
    complex_misses: AtomicU64,
    inserts: AtomicU64,
    replaces: AtomicU64,
    collisions: AtomicU64,
    priority_prevented: AtomicU64,
    page_creates: AtomicU64,
    page_removes: AtomicU64,
    sweep_pages: AtomicU64,
    sweep_removes: AtomicU64,
}

#[cfg(feature = "metrics")]
impl TableCells {
    fn read(&self, read: impl Fn(&AtomicU64) -> u64) -> CounterValues {
        CounterValues {
            hits: read(&self.hits),
            misses: read(&self.misses),
            complex_hits: read(&self.complex_hits),
            complex_misses: read(&self.complex_misses),
            inserts: read(&self.inserts),
            replaces: read(&self.replaces),
            collisions: read(&self.collisions),
            priority_prevented_collisions: read(&self.priority_prevented),
            page_creates: read(&self.page_creates),
            page_removes: read(&self.page_removes),
            sweep_pages: read(&self.sweep_pages),
            sweep_removes: read(&self.sweep_removes),
        }
    }
}

impl TableCounters {
    #[inline]
    pub fn inc_hit(&self) {
        #[cfg(feature = "metrics")]
        self.cells.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_miss(&self) {
        #[cfg(feature = "metrics")]
        self.cells.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_complex_hit(&self) {
        #[cfg(feature = "metrics")]
        self.cells.complex_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_complex_miss(&self) {
        #[cfg(feature = "metrics")]
        self.cells.complex_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_insert(&self) {
        #[cfg(feature = "metrics")]
        self.cells.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_replace(&self) {
        #[cfg(feature = "metrics")]
        self.cells.replaces.fetch_add(1, Ordering::Relaxed);
    }

    /// Primary collision resolved in favour of the incoming record.
    #[inline]
    pub fn inc_collision(&self) {
        #[cfg(feature = "metrics")]
        self.cells.collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Primary collision resolved by keeping the existing record.
    #[inline]
    pub fn inc_priority_prevented(&self) {
        #[cfg(feature = "metrics")]
        {
            self.cells.collisions.fetch_add(1, Ordering::Relaxed);
            self.cells.priority_prevented.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn inc_page_create(&self) {
        #[cfg(feature = "metrics")]
        self.cells.page_creates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_page_remove(&self) {
        #[cfg(feature = "metrics")]
        self.cells.page_removes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sweep_page(&self) {
        #[cfg(feature = "metrics")]
        self.cells.sweep_pages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sweep_remove(&self) {
        #[cfg(feature = "metrics")]
        self.cells.sweep_removes.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter without resetting it.
    pub fn peek(&self) -> CounterValues {
        self.collect(|cell| cell.load(Ordering::Relaxed))
    }

    /// Reads and zeroes every counter.
    pub fn take(&self) -> CounterValues {
        self.collect(|cell| cell.swap(0, Ordering::Relaxed))
    }

    #[cfg(feature = "metrics")]
    fn collect(&self, read: impl Fn(&AtomicU64) -> u64) -> CounterValues {
        self.cells.read(read)
    }

    #[cfg(not(feature = "metrics"))]
    fn collect(&self, _read: impl Fn(&AtomicU64) -> u64) -> CounterValues {
        CounterValues::default()
    }
}

/// Per-store delta counters.
#[derive(Debug, Default)]
pub struct StoreCounters {
    sweep_cycles: AtomicU64,
    sweep_tables: AtomicU64,
    failed_cycles: AtomicU64,
}

impl StoreCounters {
    #[inline]
    pub fn inc_sweep_cycle(&self) {
        self.sweep_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_sweep_tables(&self, n: u64) {
        self.sweep_tables.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_failed_cycle(&self) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// `(sweep_cycles, sweep_tables, failed_cycles)` without resetting.
    pub fn peek(&self) -> (u64, u64, u64) {
        (
            self.sweep_cycles.load(Ordering::Relaxed),
            self.sweep_tables.load(Ordering::Relaxed),
            self.failed_cycles.load(Ordering::Relaxed),
        )
    }

    /// `(sweep_cycles, sweep_tables, failed_cycles)`, zeroing each.
    pub fn take(&self) -> (u64, u64, u64) {
        (
            self.sweep_cycles.swap(0, Ordering::Relaxed),
            self.sweep_tables.swap(0, Ordering::Relaxed),
            self.failed_cycles.swap(0, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "metrics")]
    #[test]
    fn take_resets_counters() {
        let counters = TableCounters::default();
        counters.inc_hit();
        counters.inc_hit();
        counters.inc_miss();

        let first = counters.take();
        assert_eq!(first.hits, 2);
        assert_eq!(first.misses, 1);
        assert_eq!(counters.take(), CounterValues::default());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn peek_does_not_reset() {
        let counters = TableCounters::default();
        counters.inc_insert();
        assert_eq!(counters.peek().inserts, 1);
        assert_eq!(counters.peek().inserts, 1);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn priority_prevented_is_also_a_collision() {
        let counters = TableCounters::default();
        counters.inc_collision();
        counters.inc_priority_prevented();
        let values = counters.peek();
        assert_eq!(values.collisions, 2);
        assert_eq!(values.priority_prevented_collisions, 1);
    }

    #[cfg(not(feature = "metrics"))]
    #[test]
    fn table_counters_stay_zero_without_metrics() {
        let counters = TableCounters::default();
        counters.inc_hit();
        counters.inc_insert();
        assert_eq!(counters.peek(), CounterValues::default());
        assert_eq!(counters.take(), CounterValues::default());
    }

    #[test]
    fn accumulate_sums_fields() {
        let mut total = CounterValues::default();
        let one = CounterValues {
            hits: 3,
            sweep_removes: 1,
            ..CounterValues::default()
        };
        total.accumulate(&one);
        total.accumulate(&one);
        assert_eq!(total.hits, 6);
        assert_eq!(total.sweep_removes, 2);
    }

    #[test]
    fn store_counters_take() {
        let counters = StoreCounters::default();
        counters.inc_sweep_cycle();
        counters.add_sweep_tables(4);
        counters.inc_failed_cycle();
        assert_eq!(counters.peek(), (1, 4, 1));
        assert_eq!(counters.take(), (1, 4, 1));
        assert_eq!(counters.take(), (0, 0, 0));
    }
}
