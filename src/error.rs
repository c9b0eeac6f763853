//! Error types for the tablecache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by table operations that can fail at the call
//!   site, currently the value factory of
//!   [`Table::get_or_put`](crate::table::Table::get_or_put).
//! - [`ConfigError`]: Returned when table or store options are invalid
//!   (e.g. zero buckets, zero sweep interval).
//! - [`InvariantError`]: Returned by
//!   [`Table::check_invariants`](crate::table::Table::check_invariants) when the
//!   record/page counters disagree with the slots actually occupied.
//! - [`DisposeError`]: Returned by [`CacheValue::dispose`](crate::CacheValue::dispose).
//!   Never propagated to callers; the table logs and swallows it.
//!
//! ## Example Usage
//!
//! ```
//! use tablecache::error::CacheError;
//! use tablecache::table::{PutPolicy, Table};
//! use tablecache::TableOptions;
//!
//! let table: Table<String> = Table::new("users", &TableOptions::default());
//!
//! let result = table.get_or_put(7, || Err::<String, _>("backend down"), 0, &PutPolicy::default());
//! assert!(matches!(result, Err(CacheError::Factory { key: 7, .. })));
//! assert_eq!(table.count(), 0);
//! ```

use thiserror::Error;

/// Boxed error produced by user code (value factories, disposal hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by fallible table operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The value factory passed to `get_or_put` failed. The table is unchanged.
    #[error("value factory failed for key {key} in table '{table}': {source}")]
    Factory {
        table: String,
        key: u64,
        #[source]
        source: BoxError,
    },
}

// ---------------------------------------------------------------------------
// DisposeError
// ---------------------------------------------------------------------------

/// Error raised while releasing the resources of an evicted value.
#[derive(Debug, Error)]
#[error("failed to dispose cached value: {0}")]
pub struct DisposeError(#[source] BoxError);

impl DisposeError {
    /// Wraps any error as a disposal failure.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal table invariants are violated.
///
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when table or store options are invalid.
///
/// Produced by [`TableOptions::validate`](crate::options::TableOptions::validate),
/// [`StoreOptions::validate`](crate::options::StoreOptions::validate) and
/// [`StoreBuilder::try_build`](crate::builder::StoreBuilder::try_build).
///
/// # Example
///
/// ```
/// use tablecache::TableOptions;
///
/// let options = TableOptions { bucket_count: 0, ..TableOptions::default() };
/// let err = options.validate().unwrap_err();
/// assert!(err.to_string().contains("bucket_count"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- CacheError -------------------------------------------------------

    #[test]
    fn factory_error_mentions_table_and_key() {
        let err = CacheError::Factory {
            table: "orders".into(),
            key: 42,
            source: "timeout".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("42"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn factory_error_exposes_source() {
        use std::error::Error as _;
        let err = CacheError::Factory {
            table: "t".into(),
            key: 1,
            source: "inner".into(),
        };
        assert_eq!(err.source().map(|s| s.to_string()), Some("inner".into()));
    }

    // -- DisposeError -----------------------------------------------------

    #[test]
    fn dispose_display_wraps_message() {
        let err = DisposeError::new("handle already closed");
        assert_eq!(
            err.to_string(),
            "failed to dispose cached value: handle already closed"
        );
    }

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("count mismatch");
        assert_eq!(err.to_string(), "count mismatch");
    }

    #[test]
    fn invariant_message_accessor() {
        let err = InvariantError::new("test");
        assert_eq!(err.message(), "test");
    }

    #[test]
    fn invariant_clone_and_eq() {
        let a = InvariantError::new("x");
        let b = a.clone();
        assert_eq!(a, b);
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_display_shows_message() {
        let err = ConfigError::new("bucket_count must be > 0");
        assert_eq!(err.to_string(), "bucket_count must be > 0");
    }

    #[test]
    fn config_message_accessor() {
        let err = ConfigError::new("test");
        assert_eq!(err.message(), "test");
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_bounds<T: std::error::Error + Send + Sync + 'static>() {}
        assert_bounds::<CacheError>();
        assert_bounds::<ConfigError>();
        assert_bounds::<InvariantError>();
        assert_bounds::<DisposeError>();
    }
}
