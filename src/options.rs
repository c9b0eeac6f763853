//! Table and store configuration.
//!
//! Options are plain `serde`-deserializable structs so a host can feed them
//! from whatever declarative tree it already parses (TOML, JSON, environment).
//! Every field has a default; a partial tree only overrides what it names.
//!
//! ## Resolution order
//!
//! ```text
//!   store.table("orders")
//!        │
//!        ├─ explicit options registered for "orders"   (Store::set_table_options)
//!        ├─ StoreOptions::tables["orders"]             (declarative tree)
//!        └─ StoreOptions::default_table                (store-wide default)
//!                 └─ TableOptions::default()           (hard-coded)
//! ```
//!
//! ## Example
//!
//! ```
//! use tablecache::{StoreOptions, TableOptions};
//!
//! let json = r#"{
//!     "sweep_interval_ms": 1000,
//!     "tables": { "orders": { "bucket_count": 5000, "max_age_sec": 60 } }
//! }"#;
//! let options: StoreOptions = serde_json::from_str(json).unwrap();
//! let orders = options.resolve("orders");
//!
//! assert_eq!(orders.bucket_count, 5000);
//! assert_eq!(orders.rec_per_page, TableOptions::default().rec_per_page);
//! assert!(options.validate().is_ok());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default number of buckets per table.
pub const DEFAULT_BUCKET_COUNT: usize = 25_147;
/// Default number of slots per collision page.
pub const DEFAULT_REC_PER_PAGE: usize = 7;
/// Lock stripes per logical processor when `lock_count` is left at 0.
pub const LOCKS_PER_CPU: usize = 16;
/// Default record lifetime in seconds.
pub const DEFAULT_MAX_AGE_SEC: u32 = 300;
/// Default pause between maintenance cycles.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;
/// Default upper bound of the random delay added to each pause.
pub const DEFAULT_SWEEP_JITTER_MS: u64 = 2_500;

/// Per-table configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Number of top-level buckets; rounded up to a prime.
    pub bucket_count: usize,
    /// Slots per collision page; rounded up to a prime.
    pub rec_per_page: usize,
    /// Lock stripes; 0 means `available_parallelism() * 16`.
    pub lock_count: usize,
    /// Lifetime for records that do not carry their own. 0 disables age expiry.
    pub max_age_sec: u32,
    /// Split this table's sweep across worker threads.
    pub parallel_sweep: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            rec_per_page: DEFAULT_REC_PER_PAGE,
            lock_count: 0,
            max_age_sec: DEFAULT_MAX_AGE_SEC,
            parallel_sweep: false,
        }
    }
}

impl TableOptions {
    /// Checks that the geometry can hold at least one record.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_count == 0 {
            return Err(ConfigError::new("bucket_count must be > 0"));
        }
        if self.rec_per_page == 0 {
            return Err(ConfigError::new("rec_per_page must be > 0"));
        }
        Ok(())
    }

    /// Lock stripe count after applying the processor-based default.
    pub fn effective_lock_count(&self) -> usize {
        if self.lock_count > 0 {
            return self.lock_count;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            * LOCKS_PER_CPU
    }
}

/// Store-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Sweep tables concurrently within one maintenance cycle.
    pub parallel_sweep: bool,
    /// Publish counters to the instrumentation sink after each cycle.
    pub instrumentation_enabled: bool,
    /// Base pause between maintenance cycles.
    pub sweep_interval_ms: u64,
    /// Upper bound of the random delay added to every pause.
    pub sweep_jitter_ms: u64,
    /// Options used by tables without an entry in `tables`.
    pub default_table: TableOptions,
    /// Options for specific table names.
    pub tables: HashMap<String, TableOptions>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            parallel_sweep: false,
            instrumentation_enabled: false,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            sweep_jitter_ms: DEFAULT_SWEEP_JITTER_MS,
            default_table: TableOptions::default(),
            tables: HashMap::new(),
        }
    }
}

impl StoreOptions {
    /// Options for `name`: the named entry if present, else the store default.
    pub fn resolve(&self, name: &str) -> TableOptions {
        self.tables
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_table.clone())
    }

    /// Base sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Validates the store settings and every table entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::new("sweep_interval_ms must be > 0"));
        }
        self.default_table
            .validate()
            .map_err(|e| ConfigError::new(format!("default_table: {e}")))?;
        for (name, table) in &self.tables {
            table
                .validate()
                .map_err(|e| ConfigError::new(format!("table '{name}': {e}")))?;
        }
        Ok(())
    }
}
