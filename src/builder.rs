//! Store builder.
//!
//! Collects store options, per-table overrides and the instrumentation sink,
//! validates them, and starts the store.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tablecache::builder::StoreBuilder;
//! use tablecache::TableOptions;
//!
//! let store = StoreBuilder::new("orders")
//!     .sweep_interval(Duration::from_secs(2))
//!     .table(
//!         "open",
//!         TableOptions { bucket_count: 1_000, max_age_sec: 30, ..TableOptions::default() },
//!     )
//!     .try_build::<String>()
//!     .unwrap();
//!
//! assert_eq!(store.table("open").bucket_count(), 1_009);
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::metrics::traits::Instrumentation;
use crate::options::{StoreOptions, TableOptions};
use crate::store::Store;
use crate::traits::CacheValue;

/// Builder for [`Store`] instances.
#[derive(Clone)]
pub struct StoreBuilder {
    name: String,
    options: StoreOptions,
    instrumentation: Option<Arc<dyn Instrumentation>>,
}

impl StoreBuilder {
    /// Starts from [`StoreOptions::default`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: StoreOptions::default(),
            instrumentation: None,
        }
    }

    /// Replaces all options, e.g. with a deserialized tree.
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Options for tables without an entry of their own.
    pub fn default_table(mut self, options: TableOptions) -> Self {
        self.options.default_table = options;
        self
    }

    /// Options for the table called `name`.
    pub fn table(mut self, name: impl Into<String>, options: TableOptions) -> Self {
        self.options.tables.insert(name.into(), options);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.options.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn sweep_jitter(mut self, jitter: Duration) -> Self {
        self.options.sweep_jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn parallel_sweep(mut self, enabled: bool) -> Self {
        self.options.parallel_sweep = enabled;
        self
    }

    /// Publishes counters to `sink` after every maintenance cycle.
    pub fn instrumentation(mut self, sink: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = Some(sink);
        self.options.instrumentation_enabled = true;
        self
    }

    /// Validates the options and starts the store.
    pub fn try_build<V: CacheValue>(self) -> Result<Store<V>, ConfigError> {
        self.options.validate()?;
        if self.options.instrumentation_enabled && self.instrumentation.is_none() {
            return Err(ConfigError::new(
                "instrumentation_enabled is set but no instrumentation sink was given",
            ));
        }
        Ok(Store::with_instrumentation(
            self.name,
            self.options,
            self.instrumentation,
        ))
    }

    /// Starts the store without validating; see [`Store::new`].
    pub fn build<V: CacheValue>(self) -> Store<V> {
        Store::with_instrumentation(self.name, self.options, self.instrumentation)
    }
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("instrumentation", &self.instrumentation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_build_rejects_zero_interval() {
        let result = StoreBuilder::new("s")
            .sweep_interval(Duration::ZERO)
            .try_build::<u32>();
        assert!(result.unwrap_err().message().contains("sweep_interval_ms"));
    }

    #[test]
    fn try_build_rejects_bad_table_entry() {
        let result = StoreBuilder::new("s")
            .table(
                "t",
                TableOptions {
                    bucket_count: 0,
                    ..TableOptions::default()
                },
            )
            .try_build::<u32>();
        assert!(result.is_err());
    }

    #[test]
    fn enabled_instrumentation_needs_a_sink() {
        let options = StoreOptions {
            instrumentation_enabled: true,
            ..StoreOptions::default()
        };
        let result = StoreBuilder::new("s").options(options).try_build::<u32>();
        assert!(result.is_err());
    }

    #[test]
    fn builder_options_reach_the_store() {
        let store = StoreBuilder::new("named")
            .sweep_interval(Duration::from_millis(1_500))
            .sweep_jitter(Duration::ZERO)
            .parallel_sweep(true)
            .default_table(TableOptions {
                bucket_count: 7,
                ..TableOptions::default()
            })
            .try_build::<u32>()
            .unwrap();

        assert_eq!(store.name(), "named");
        assert_eq!(store.options().sweep_interval_ms, 1_500);
        assert!(store.options().parallel_sweep);
        assert_eq!(store.table("any").bucket_count(), 7);
    }
}
