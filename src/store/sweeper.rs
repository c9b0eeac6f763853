//! Maintenance thread: waits, sweeps every table, publishes counters.
//!
//! A panic inside one cycle is caught, counted and logged; the loop carries
//! on with the next cycle. A panic escaping the loop itself ends the thread
//! while the store keeps serving reads and writes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use rand::Rng;

use super::{LOG_TARGET, StoreInner};
use crate::metrics::snapshot::{StoreMetricsSnapshot, TableMetricsSnapshot};
use crate::metrics::traits::MetricsExporter;
use crate::table::{SweepStats, Table};
use crate::traits::CacheValue;

/// Totals for one maintenance cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub tables: usize,
    pub pages: usize,
    pub removed: usize,
}

impl CycleStats {
    fn add(&mut self, table: SweepStats) {
        self.tables += 1;
        self.pages += table.pages;
        self.removed += table.removed;
    }
}

pub(super) fn spawn<V: CacheValue>(inner: Arc<StoreInner<V>>) -> Option<JoinHandle<()>> {
    let name = inner.name.clone();
    let thread_inner = Arc::clone(&inner);
    match thread::Builder::new()
        .name(format!("tablecache-sweep-{name}"))
        .spawn(move || run(thread_inner))
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            inner.running.store(false, Ordering::Release);
            log::error!(target: LOG_TARGET, "failed to spawn maintenance thread for store '{name}': {err}");
            None
        },
    }
}

fn run<V: CacheValue>(inner: Arc<StoreInner<V>>) {
    log::info!(target: LOG_TARGET, "maintenance thread for store '{}' started", inner.name);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        while wait_next_cycle(&inner) {
            let cycle = panic::catch_unwind(AssertUnwindSafe(|| run_cycle(&inner, SystemTime::now())));
            if let Err(payload) = cycle {
                inner.counters.inc_failed_cycle();
                log::error!(
                    target: LOG_TARGET,
                    "maintenance cycle of store '{}' failed: {}",
                    inner.name,
                    panic_message(payload.as_ref())
                );
            }
        }
    }));

    if let Err(payload) = outcome {
        log::error!(
            target: LOG_TARGET,
            "maintenance thread of store '{}' terminated: {}",
            inner.name,
            panic_message(payload.as_ref())
        );
    }
    inner.running.store(false, Ordering::Release);
    log::info!(target: LOG_TARGET, "maintenance thread for store '{}' stopped", inner.name);
}

/// Sleeps for the interval plus jitter. Returns false once shutdown is requested.
fn wait_next_cycle<V>(inner: &StoreInner<V>) -> bool {
    let options = &inner.options;
    let jitter = if options.sweep_jitter_ms > 0 {
        rand::rng().random_range(0..=options.sweep_jitter_ms)
    } else {
        0
    };
    let delay = Duration::from_millis(options.sweep_interval_ms.max(1).saturating_add(jitter));

    let mut shutdown = inner.shutdown.lock();
    if !*shutdown {
        inner
            .wake
            .wait_while_for(&mut shutdown, |stopped| !*stopped, delay);
    }
    !*shutdown
}

/// Sweeps every registered table at `now`, then publishes when enabled.
pub(super) fn run_cycle<V: CacheValue>(inner: &StoreInner<V>, now: SystemTime) -> CycleStats {
    let tables = inner.tables();
    let mut stats = CycleStats::default();

    if inner.options.parallel_sweep && tables.len() > 1 {
        thread::scope(|scope| {
            let handles: Vec<_> = tables
                .iter()
                .map(|table| scope.spawn(move || table.sweep(now, &inner.running)))
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(table_stats) => stats.add(table_stats),
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
        });
    } else {
        for table in &tables {
            stats.add(table.sweep(now, &inner.running));
        }
    }

    inner.counters.inc_sweep_cycle();
    inner.counters.add_sweep_tables(stats.tables as u64);
    log::debug!(
        target: LOG_TARGET,
        "store '{}' swept {} tables, removed {} records",
        inner.name,
        stats.tables,
        stats.removed
    );

    if inner.options.instrumentation_enabled {
        publish(inner, &tables);
    }
    stats
}

fn publish<V: CacheValue>(inner: &StoreInner<V>, tables: &[Arc<Table<V>>]) {
    let Some(sink) = inner.instrumentation.as_deref() else {
        return;
    };
    let (sweep_cycles, sweep_tables, failed_cycles) = inner.counters.take();
    let mut store = StoreMetricsSnapshot {
        store: inner.name.clone(),
        sweep_cycles,
        sweep_tables,
        failed_cycles,
        ..StoreMetricsSnapshot::default()
    };
    for table in tables {
        let snapshot = table.take_metrics(&inner.name);
        store.totals.accumulate(&snapshot.counters);
        store.table_count += 1;
        store.record_count += snapshot.record_count;
        store.page_count += snapshot.page_count;
        MetricsExporter::<TableMetricsSnapshot>::export(sink, &snapshot);
    }
    MetricsExporter::<StoreMetricsSnapshot>::export(sink, &store);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
