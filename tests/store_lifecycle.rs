// ==============================================
// STORE LIFECYCLE TESTS (integration)
// ==============================================
//
// Maintenance thread behaviour: background expiry, failure isolation,
// publishing to an instrumentation sink, and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tablecache::error::DisposeError;
use tablecache::metrics::{MetricsExporter, StoreMetricsSnapshot, TableMetricsSnapshot};
use tablecache::{CacheValue, Store, StoreBuilder, StoreOptions, TableOptions};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_table(max_age_sec: u32) -> TableOptions {
    TableOptions {
        bucket_count: 101,
        rec_per_page: 3,
        lock_count: 4,
        max_age_sec,
        parallel_sweep: false,
    }
}

fn fast_options(max_age_sec: u32) -> StoreOptions {
    StoreOptions {
        sweep_interval_ms: 20,
        sweep_jitter_ms: 5,
        default_table: small_table(max_age_sec),
        ..StoreOptions::default()
    }
}

fn idle_options(max_age_sec: u32) -> StoreOptions {
    StoreOptions {
        sweep_interval_ms: 600_000,
        sweep_jitter_ms: 0,
        default_table: small_table(max_age_sec),
        ..StoreOptions::default()
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

// ==============================================
// Background expiry
// ==============================================

#[test]
fn background_thread_expires_records() {
    init_logging();
    let store: Store<String> = Store::new("expiry", fast_options(1));
    let table = store.table("t");
    table.put(1, "short-lived".into());
    table.put(2, "other".into());

    assert!(table.get(1).is_some());
    assert!(wait_until(Duration::from_secs(10), || table.count() == 0));
    assert!(table.get(1).is_none());
    assert!(store.metrics().sweep_cycles > 0);
}

#[test]
fn zero_lifetime_table_keeps_records() {
    init_logging();
    let store: Store<u32> = Store::new("forever", fast_options(0));
    let table = store.table("t");
    table.put(1, 1);

    assert!(wait_until(Duration::from_secs(5), || store.metrics().sweep_cycles >= 5));
    assert_eq!(*table.get(1).unwrap().value(), 1);
    assert!(table.get(1).unwrap().create_timestamp().is_some());
}

#[test]
fn parallel_sweep_covers_every_table() {
    init_logging();
    let options = StoreOptions {
        parallel_sweep: true,
        ..idle_options(1)
    };
    let store: Store<u32> = Store::new("parallel", options);
    for name in ["a", "b", "c"] {
        let table = store.table(name);
        for key in 0..10 {
            table.put(key, key as u32);
        }
    }

    assert_eq!(store.sweep_now().tables, 3);
    thread::sleep(Duration::from_millis(2_100));
    let stats = store.sweep_now();

    assert_eq!(stats.removed, 30);
    assert_eq!(store.metrics().record_count, 0);
}

// ==============================================
// Registry races
// ==============================================

#[test]
fn racing_creators_observe_one_table() {
    let store: Arc<Store<u32>> = Arc::new(Store::new("race", idle_options(60)));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.table("shared")
            })
        })
        .collect();

    let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    assert_eq!(store.table_count(), 1);
}

// ==============================================
// Failure isolation
// ==============================================

struct Exploding;

impl CacheValue for Exploding {
    fn dispose(&self) -> Result<(), DisposeError> {
        panic!("dispose exploded");
    }
}

#[test]
fn panicking_cycle_is_counted_and_loop_continues() {
    init_logging();
    let store: Store<Exploding> = Store::new("faulty", fast_options(1));
    let table = store.table("t");
    table.put(1, Exploding);

    assert!(wait_until(Duration::from_secs(10), || store.metrics().failed_cycles >= 1));
    assert!(store.is_running());

    let cycles = store.metrics().sweep_cycles;
    assert!(wait_until(Duration::from_secs(5), || store.metrics().sweep_cycles > cycles));
    assert_eq!(table.count(), 0);
    table.check_invariants().unwrap();
}

struct FailingDispose(Arc<AtomicUsize>);

impl CacheValue for FailingDispose {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(DisposeError::new("connection already closed"))
    }
}

#[test]
fn dispose_errors_do_not_fail_the_cycle() {
    init_logging();
    let disposed = Arc::new(AtomicUsize::new(0));
    let store: Store<FailingDispose> = Store::new("dispose", fast_options(1));
    let table = store.table("t");
    table.put(1, FailingDispose(Arc::clone(&disposed)));

    assert!(wait_until(Duration::from_secs(10), || disposed.load(Ordering::SeqCst) == 1));
    assert_eq!(store.metrics().failed_cycles, 0);
}

// ==============================================
// Instrumentation
// ==============================================

#[derive(Default)]
struct RecordingSink {
    tables: Mutex<Vec<TableMetricsSnapshot>>,
    stores: Mutex<Vec<StoreMetricsSnapshot>>,
}

impl MetricsExporter<TableMetricsSnapshot> for RecordingSink {
    fn export(&self, snapshot: &TableMetricsSnapshot) {
        self.tables.lock().push(snapshot.clone());
    }
}

impl MetricsExporter<StoreMetricsSnapshot> for RecordingSink {
    fn export(&self, snapshot: &StoreMetricsSnapshot) {
        self.stores.lock().push(snapshot.clone());
    }
}

#[cfg(feature = "metrics")]
#[test]
fn publish_exports_deltas_and_resets_counters() {
    let sink = Arc::new(RecordingSink::default());
    let store = StoreBuilder::new("metrics")
        .options(idle_options(60))
        .instrumentation(sink.clone())
        .try_build::<u32>()
        .unwrap();
    let table = store.table("orders");
    table.put(1, 10);
    table.get(1);
    table.get(2);

    store.sweep_now();
    {
        let tables = sink.tables.lock();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].store, "metrics");
        assert_eq!(tables[0].table, "orders");
        assert_eq!(tables[0].counters.hits, 1);
        assert_eq!(tables[0].counters.misses, 1);
        assert_eq!(tables[0].counters.inserts, 1);
        assert_eq!(tables[0].record_count, 1);

        let stores = sink.stores.lock();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].sweep_cycles, 1);
        assert_eq!(stores[0].table_count, 1);
        assert_eq!(stores[0].totals.hits, 1);
    }

    table.get(1);
    store.sweep_now();
    let tables = sink.tables.lock();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[1].counters.hits, 1);
    assert_eq!(tables[1].counters.misses, 0);
    assert_eq!(tables[1].counters.inserts, 0);
}

#[test]
fn publish_reports_gauges_once_per_cycle() {
    let sink = Arc::new(RecordingSink::default());
    let store = StoreBuilder::new("gauges")
        .options(idle_options(60))
        .instrumentation(sink.clone())
        .try_build::<u32>()
        .unwrap();
    store.table("a").put(1, 1);
    store.table("b").put(2, 2);

    store.sweep_now();
    store.stop();
    store.sweep_now();

    let mut tables = sink.tables.lock().clone();
    tables.sort_by(|x, y| x.table.cmp(&y.table));
    assert_eq!(tables.len(), 2);
    assert_eq!((tables[0].table.as_str(), tables[0].record_count), ("a", 1));
    assert_eq!((tables[1].table.as_str(), tables[1].record_count), ("b", 1));
    assert_eq!(sink.stores.lock().len(), 1);
}

#[cfg(feature = "metrics")]
#[test]
fn prometheus_exporter_as_store_sink() {
    use tablecache::metrics::PrometheusTextExporter;

    let exporter = Arc::new(PrometheusTextExporter::new("tc", Vec::new()));
    let store = StoreBuilder::new("prom")
        .options(idle_options(60))
        .instrumentation(exporter.clone())
        .try_build::<u32>()
        .unwrap();
    store.table("t").put(1, 1);
    store.sweep_now();
    drop(store);

    let exporter = Arc::try_unwrap(exporter).ok().unwrap();
    let text = String::from_utf8(exporter.into_inner()).unwrap();
    assert!(text.contains("tc_table_inserts_total{store=\"prom\",table=\"t\"} 1"));
    assert!(text.contains("tc_store_sweep_cycles_total{store=\"prom\"} 1"));
}

// ==============================================
// Shutdown
// ==============================================

#[test]
fn stop_joins_thread_and_tables_stay_usable() {
    init_logging();
    let store: Store<u32> = Store::new("stopping", fast_options(1));
    let table = store.table("t");

    let started = Instant::now();
    store.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!store.is_running());

    table.put(1, 1);
    let cycles = store.metrics().sweep_cycles;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(store.metrics().sweep_cycles, cycles);
    assert!(table.get(1).is_some());
}

#[test]
fn dropping_store_interrupts_long_wait() {
    let store: Store<u32> = Store::new("drop", idle_options(60));
    let table = store.table("t");
    table.put(1, 1);

    let started = Instant::now();
    drop(store);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(*table.get(1).unwrap().value(), 1);
}
