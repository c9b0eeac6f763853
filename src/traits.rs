//! # Value Trait
//!
//! Tables store values behind `Arc<V>` and hand the same `Arc` to every
//! reader, so the value is only *dropped* once the last reader lets go. Values
//! that hold external resources (pooled connections, file handles, leases)
//! often want to release them as soon as the cache stops referencing them.
//! [`CacheValue::dispose`] is that hook.
//!
//! ## When `dispose` runs
//!
//! ```text
//!   remove(key)                ──► dispose(old value)
//!   sweep evicts expired entry ──► dispose(old value)
//!   put(same key, new value)   ──► dispose(old value)   (record reused in place)
//!   put(colliding key) wins    ──► dispose(overwritten value)
//! ```
//!
//! A failing `dispose` never aborts the operation that triggered it: the error
//! is logged at `warn` under the `tablecache::record` target and swallowed.
//!
//! ## Implementing
//!
//! Plain data types only need an empty impl; the default `dispose` is a no-op.
//!
//! ```
//! use tablecache::CacheValue;
//! use tablecache::error::DisposeError;
//!
//! struct Session {
//!     id: u64,
//! }
//!
//! impl CacheValue for Session {}
//!
//! struct Lease {
//!     released: std::sync::atomic::AtomicBool,
//! }
//!
//! impl CacheValue for Lease {
//!     fn dispose(&self) -> Result<(), DisposeError> {
//!         if self.released.swap(true, std::sync::atomic::Ordering::AcqRel) {
//!             return Err(DisposeError::new("lease released twice"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::error::DisposeError;

/// Values that can be stored in a [`Table`](crate::table::Table).
pub trait CacheValue: Send + Sync + 'static {
    /// Releases resources owned by the value once the cache stops referencing it.
    fn dispose(&self) -> Result<(), DisposeError> {
        Ok(())
    }
}

macro_rules! plain_cache_value {
    ($($ty:ty),* $(,)?) => {
        $(impl CacheValue for $ty {})*
    };
}

plain_cache_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
    Box<str>,
    Arc<str>,
);

impl<T: Send + Sync + 'static> CacheValue for Vec<T> {}

impl<T: CacheValue> CacheValue for Box<T> {
    fn dispose(&self) -> Result<(), DisposeError> {
        (**self).dispose()
    }
}

impl<T: CacheValue> CacheValue for Option<T> {
    fn dispose(&self) -> Result<(), DisposeError> {
        match self {
            Some(inner) => inner.dispose(),
            None => Ok(()),
        }
    }
}
