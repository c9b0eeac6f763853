//! # Table Store
//!
//! A [`Store`] is a named registry of [`Table`]s sharing one value type, plus
//! the per-table options used to create them and a dedicated maintenance
//! thread that ages and expires records.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────── Store<V> ───────────────────────────────┐
//!   │                                                                         │
//!   │   inner: Arc<StoreInner<V>>  ◄──────────── shared with ───────────┐     │
//!   │     ├─ tables:        RwLock<FxHashMap<String, Arc<Table<V>>>>    │     │
//!   │     ├─ table_options: RwLock<FxHashMap<String, TableOptions>>     │     │
//!   │     ├─ options:       StoreOptions                                │     │
//!   │     ├─ counters:      StoreCounters                               │     │
//!   │     └─ shutdown:      Mutex<bool> + Condvar                       │     │
//!   │                                                                   │     │
//!   │   worker: JoinHandle  ────────────────►  maintenance thread ──────┘     │
//!   │                                           loop {                        │
//!   │                                             wait interval + jitter      │
//!   │                                             sweep every table           │
//!   │                                             publish snapshots           │
//!   │                                           }                             │
//!   └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! - [`Store::new`] (or [`StoreBuilder`](crate::builder::StoreBuilder)) starts
//!   the maintenance thread immediately.
//! - [`Store::table`] is get-or-create: racing creators of one name all receive
//!   the same `Arc<Table<V>>`.
//! - [`Store::stop`] interrupts the wait, joins the thread and is idempotent.
//!   Dropping the store stops it. Tables handed out earlier keep working; they
//!   simply stop expiring.
//!
//! ## Example Usage
//!
//! ```
//! use tablecache::{Store, StoreOptions, TableOptions};
//!
//! let store: Store<String> = Store::new("app", StoreOptions::default());
//! store
//!     .set_table_options("sessions", TableOptions { max_age_sec: 60, ..TableOptions::default() })
//!     .unwrap();
//!
//! let sessions = store.table("sessions");
//! sessions.put(7, "alice".to_string());
//!
//! assert!(std::sync::Arc::ptr_eq(&sessions, &store.table("sessions")));
//! assert_eq!(sessions.default_max_age_sec(), 60);
//!
//! store.stop();
//! assert!(!store.is_running());
//! ```

mod sweeper;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::ConfigError;
use crate::metrics::counters::{CounterValues, StoreCounters};
use crate::metrics::snapshot::StoreMetricsSnapshot;
use crate::metrics::traits::{Instrumentation, MetricsSnapshotProvider};
use crate::options::{StoreOptions, TableOptions};
use crate::table::Table;
use crate::traits::CacheValue;

pub use sweeper::CycleStats;

pub(crate) const LOG_TARGET: &str = "tablecache::store";

pub(crate) struct StoreInner<V> {
    name: String,
    options: StoreOptions,
    tables: RwLock<FxHashMap<String, Arc<Table<V>>>>,
    table_options: RwLock<FxHashMap<String, TableOptions>>,
    instrumentation: Option<Arc<dyn Instrumentation>>,
    counters: StoreCounters,
    running: AtomicBool,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl<V> StoreInner<V> {
    fn resolve_options(&self, name: &str) -> TableOptions {
        match self.table_options.read().get(name) {
            Some(options) => options.clone(),
            None => self.options.resolve(name),
        }
    }

    fn tables(&self) -> Vec<Arc<Table<V>>> {
        self.tables.read().values().cloned().collect()
    }
}

/// Named registry of tables with a background maintenance thread.
pub struct Store<V: CacheValue> {
    inner: Arc<StoreInner<V>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<V: CacheValue> Store<V> {
    /// Creates a store and starts its maintenance thread.
    ///
    /// Invalid options are logged and used as given; call
    /// [`StoreOptions::validate`] first, or build through
    /// [`StoreBuilder::try_build`](crate::builder::StoreBuilder::try_build), to
    /// reject them instead.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// assert!(store.is_running());
    /// assert_eq!(store.table_count(), 0);
    /// ```
    pub fn new(name: impl Into<String>, options: StoreOptions) -> Self {
        Self::with_instrumentation(name, options, None)
    }

    pub(crate) fn with_instrumentation(
        name: impl Into<String>,
        options: StoreOptions,
        instrumentation: Option<Arc<dyn Instrumentation>>,
    ) -> Self {
        let name = name.into();
        if let Err(err) = options.validate() {
            log::warn!(target: LOG_TARGET, "store '{name}' created with invalid options: {err}");
        }
        let inner = Arc::new(StoreInner {
            name,
            options,
            tables: RwLock::new(FxHashMap::default()),
            table_options: RwLock::new(FxHashMap::default()),
            instrumentation,
            counters: StoreCounters::default(),
            running: AtomicBool::new(true),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        });
        let worker = sweeper::spawn(Arc::clone(&inner));
        Self {
            inner,
            worker: Mutex::new(worker),
        }
    }

    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// assert_eq!(store.name(), "prices");
    /// ```
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// True while the maintenance thread is alive and not asked to stop.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Returns the table called `name`, creating it on first use.
    ///
    /// Options come from [`set_table_options`](Self::set_table_options), then
    /// the store's per-name options, then its default table options.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// let eur = store.table("eur");
    /// eur.put(1, 100);
    ///
    /// assert!(Arc::ptr_eq(&eur, &store.table("eur")));
    /// assert_eq!(*store.table("eur").get(1).unwrap().value(), 100);
    /// ```
    pub fn table(&self, name: &str) -> Arc<Table<V>> {
        if let Some(table) = self.inner.tables.read().get(name) {
            return Arc::clone(table);
        }
        let options = self.inner.resolve_options(name);
        let mut tables = self.inner.tables.write();
        let table = tables.entry(name.to_string()).or_insert_with(|| {
            log::debug!(
                target: LOG_TARGET,
                "store '{}' created table '{name}' ({} buckets)",
                self.inner.name,
                options.bucket_count
            );
            Arc::new(Table::new(name, &options))
        });
        Arc::clone(table)
    }

    /// Unregisters `name`. Handles already held stay usable but are no longer
    /// swept. Returns false when no such table exists.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// let held = store.table("eur");
    /// held.put(1, 100);
    ///
    /// assert!(store.drop_table("eur"));
    /// assert!(!store.contains_table("eur"));
    /// assert!(held.get(1).is_some());
    /// assert!(!store.drop_table("eur"));
    /// ```
    pub fn drop_table(&self, name: &str) -> bool {
        self.inner.tables.write().remove(name).is_some()
    }

    /// Registers options for `name`, applied when the table is next created.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `options` fail validation.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions, TableOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// let options = TableOptions { bucket_count: 97, max_age_sec: 30, ..TableOptions::default() };
    /// store.set_table_options("eur", options).unwrap();
    ///
    /// assert_eq!(store.table_options("eur").max_age_sec, 30);
    /// assert_eq!(store.table("eur").bucket_count(), 97);
    ///
    /// let bad = TableOptions { bucket_count: 0, ..TableOptions::default() };
    /// assert!(store.set_table_options("usd", bad).is_err());
    /// ```
    pub fn set_table_options(&self, name: &str, options: TableOptions) -> Result<(), ConfigError> {
        options
            .validate()
            .map_err(|e| ConfigError::new(format!("table '{name}': {e}")))?;
        self.inner
            .table_options
            .write()
            .insert(name.to_string(), options);
        Ok(())
    }

    /// Options `name` is, or would be, created with.
    pub fn table_options(&self, name: &str) -> TableOptions {
        self.inner.resolve_options(name)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.inner.tables.read().contains_key(name)
    }

    /// Registered table names, sorted.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// store.table("usd");
    /// store.table("eur");
    /// assert_eq!(store.table_names(), ["eur", "usd"]);
    /// assert_eq!(store.table_count(), 2);
    /// ```
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn table_count(&self) -> usize {
        self.inner.tables.read().len()
    }

    /// Runs one maintenance cycle on the calling thread.
    ///
    /// The cycle is the same one the maintenance thread runs, including
    /// publishing; it may overlap with a concurrent background cycle. A
    /// stopped store does nothing, counts nothing and returns empty stats.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let options = StoreOptions { sweep_interval_ms: 600_000, ..StoreOptions::default() };
    /// let store: Store<u64> = Store::new("prices", options);
    /// store.table("eur").put(1, 100);
    ///
    /// let stats = store.sweep_now();
    /// assert_eq!(stats.tables, 1);
    /// assert_eq!(store.metrics().sweep_cycles, 1);
    ///
    /// store.stop();
    /// assert_eq!(store.sweep_now().tables, 0);
    /// assert_eq!(store.metrics().sweep_cycles, 1);
    /// ```
    pub fn sweep_now(&self) -> CycleStats {
        if !self.is_running() {
            return CycleStats::default();
        }
        sweeper::run_cycle(&self.inner, SystemTime::now())
    }

    /// Stops the maintenance thread and waits for it to exit. Idempotent.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// let eur = store.table("eur");
    ///
    /// store.stop();
    /// store.stop();
    /// assert!(!store.is_running());
    /// eur.put(1, 100);
    /// ```
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        {
            let mut shutdown = self.inner.shutdown.lock();
            *shutdown = true;
            self.inner.wake.notify_all();
        }
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!(target: LOG_TARGET, "maintenance thread of store '{}' panicked", self.inner.name);
        }
    }

    /// Running totals across all registered tables. Does not reset counters.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{Store, StoreOptions};
    ///
    /// let store: Store<u64> = Store::new("prices", StoreOptions::default());
    /// store.table("eur").put(1, 100);
    /// store.table("usd").put(1, 110);
    ///
    /// let metrics = store.metrics();
    /// assert_eq!(metrics.table_count, 2);
    /// assert_eq!(metrics.record_count, 2);
    /// ```
    pub fn metrics(&self) -> StoreMetricsSnapshot {
        let (sweep_cycles, sweep_tables, failed_cycles) = self.inner.counters.peek();
        let mut snapshot = StoreMetricsSnapshot {
            store: self.inner.name.clone(),
            sweep_cycles,
            sweep_tables,
            failed_cycles,
            totals: CounterValues::default(),
            table_count: 0,
            record_count: 0,
            page_count: 0,
        };
        for table in self.inner.tables() {
            let metrics = table.metrics();
            snapshot.totals.accumulate(&metrics.counters);
            snapshot.table_count += 1;
            snapshot.record_count += metrics.record_count;
            snapshot.page_count += metrics.page_count;
        }
        snapshot
    }
}

impl<V: CacheValue> MetricsSnapshotProvider<StoreMetricsSnapshot> for Store<V> {
    fn snapshot(&self) -> StoreMetricsSnapshot {
        self.metrics()
    }
}

impl<V: CacheValue> Drop for Store<V> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<V: CacheValue> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("tables", &self.table_names())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_options() -> StoreOptions {
        StoreOptions {
            sweep_interval_ms: 60_000,
            sweep_jitter_ms: 0,
            default_table: TableOptions {
                bucket_count: 101,
                rec_per_page: 3,
                lock_count: 4,
                max_age_sec: 1,
                parallel_sweep: false,
            },
            ..StoreOptions::default()
        }
    }

    #[test]
    fn table_is_get_or_create() {
        let store: Store<u32> = Store::new("s", quiet_options());
        let a = store.table("a");
        let again = store.table("a");
        let b = store.table("b");

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.table_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn drop_table_unregisters_only() {
        let store: Store<u32> = Store::new("s", quiet_options());
        let table = store.table("t");
        table.put(1, 1);

        assert!(store.drop_table("t"));
        assert!(!store.drop_table("t"));
        assert!(!store.contains_table("t"));
        assert!(table.get(1).is_some());
        assert!(store.table("t").get(1).is_none());
    }

    #[test]
    fn explicit_options_win_over_store_defaults() {
        let mut options = quiet_options();
        options.tables.insert(
            "declared".into(),
            TableOptions {
                bucket_count: 13,
                ..options.default_table.clone()
            },
        );
        let store: Store<u32> = Store::new("s", options);
        store
            .set_table_options(
                "explicit",
                TableOptions {
                    bucket_count: 17,
                    ..TableOptions::default()
                },
            )
            .unwrap();

        assert_eq!(store.table("declared").bucket_count(), 13);
        assert_eq!(store.table("explicit").bucket_count(), 17);
        assert_eq!(store.table("other").bucket_count(), 101);
    }

    #[test]
    fn invalid_table_options_are_rejected() {
        let store: Store<u32> = Store::new("s", quiet_options());
        let err = store
            .set_table_options(
                "bad",
                TableOptions {
                    rec_per_page: 0,
                    ..TableOptions::default()
                },
            )
            .unwrap_err();
        assert!(err.message().contains("bad"));
    }

    #[test]
    fn sweep_now_expires_and_counts() {
        let store: Store<u32> = Store::new("s", quiet_options());
        let table = store.table("t");
        table.put(1, 1);

        let first = store.sweep_now();
        assert_eq!(first.tables, 1);
        assert_eq!(first.removed, 0);

        let stats = sweeper::run_cycle(&store.inner, SystemTime::now() + std::time::Duration::from_secs(5));
        assert_eq!(stats.removed, 1);
        assert!(table.get(1).is_none());

        let metrics = store.metrics();
        assert_eq!(metrics.sweep_cycles, 2);
        assert_eq!(metrics.sweep_tables, 2);
        #[cfg(feature = "metrics")]
        assert_eq!(metrics.totals.sweep_removes, 1);
    }

    #[test]
    fn sweep_now_after_stop_is_a_no_op() {
        let store: Store<u32> = Store::new("s", quiet_options());
        let table = store.table("t");
        table.put(1, 1);
        store.sweep_now();
        store.stop();

        assert_eq!(store.sweep_now(), CycleStats::default());
        let metrics = store.metrics();
        assert_eq!(metrics.sweep_cycles, 1);
        assert_eq!(metrics.sweep_tables, 1);
        assert!(table.get(1).is_some());
    }

    #[test]
    fn stop_is_idempotent() {
        let store: Store<u32> = Store::new("s", quiet_options());
        assert!(store.is_running());
        store.stop();
        store.stop();
        assert!(!store.is_running());
        store.table("still-usable").put(1, 2);
    }
}
