//! Cache records and the put policy that shapes them.
//!
//! ## Layout
//!
//! ```text
//!   ┌──────────────────────────── Record<V> ────────────────────────────┐
//!   │ key: u64                       immutable                          │
//!   │ state: ArcSwap<RecordState>    value + policy, swapped as a unit  │
//!   │   ├─ value: Arc<V>                                                │
//!   │   ├─ max_age_sec / priority / absolute_expiration                 │
//!   │   └─ metadata: Option<Arc<dyn Any>>                               │
//!   │ created_ms: AtomicI64          0 until the first sweep stamps it  │
//!   │ age_sec:    AtomicU32          written by the sweep only          │
//!   │ hit_count:  AtomicU64          written by the read path only      │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A record is reused in place when a put targets its key: the maintenance
//! fields are reset first, then the new state is published with a single
//! release swap. A lock-free reader therefore observes either the old
//! generation or the new one as a whole, never a half-written mix of value and
//! policy.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;

use crate::traits::CacheValue;

/// Free-form tag attached to a record.
pub type Metadata = Arc<dyn Any + Send + Sync>;

const UNSTAMPED: i64 = 0;

/// Lifetime and collision policy applied by a put.
#[derive(Debug, Clone, Default)]
pub struct PutPolicy {
    /// Lifetime override in seconds; 0 uses the table default.
    pub max_age_sec: u32,
    /// Collision priority; the higher (or equal, if later) record wins a slot.
    pub priority: i32,
    /// Hard expiration instant, independent of age.
    pub absolute_expiration: Option<SystemTime>,
    /// Tag stored alongside the value.
    pub metadata: Option<Metadata>,
}

impl PutPolicy {
    pub fn with_max_age(mut self, max_age_sec: u32) -> Self {
        self.max_age_sec = max_age_sec;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn expires_at(mut self, at: SystemTime) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

struct RecordState<V> {
    value: Arc<V>,
    max_age_sec: u32,
    priority: i32,
    absolute_expiration: Option<SystemTime>,
    metadata: Option<Metadata>,
}

impl<V> RecordState<V> {
    fn new(value: Arc<V>, policy: &PutPolicy) -> Self {
        Self {
            value,
            max_age_sec: policy.max_age_sec,
            priority: policy.priority,
            absolute_expiration: policy.absolute_expiration,
            metadata: policy.metadata.clone(),
        }
    }
}

/// Result of aging a record during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Aging {
    /// First sighting: the creation time was stamped, nothing else checked.
    Stamped,
    Alive,
    Expired,
}

/// One cached item.
pub struct Record<V> {
    key: u64,
    state: ArcSwap<RecordState<V>>,
    created_ms: AtomicI64,
    age_sec: AtomicU32,
    hit_count: AtomicU64,
}

impl<V> Record<V> {
    pub(crate) fn new(key: u64, value: Arc<V>, policy: &PutPolicy) -> Self {
        Self {
            key,
            state: ArcSwap::from_pointee(RecordState::new(value, policy)),
            created_ms: AtomicI64::new(UNSTAMPED),
            age_sec: AtomicU32::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    /// Key this record was created for.
    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Current value.
    pub fn value(&self) -> Arc<V> {
        Arc::clone(&self.state.load().value)
    }

    /// Lifetime override in seconds; 0 means the table default applies.
    pub fn max_age_sec(&self) -> u32 {
        self.state.load().max_age_sec
    }

    pub fn priority(&self) -> i32 {
        self.state.load().priority
    }

    pub fn absolute_expiration(&self) -> Option<SystemTime> {
        self.state.load().absolute_expiration
    }

    pub fn metadata(&self) -> Option<Metadata> {
        self.state.load().metadata.clone()
    }

    /// True when the metadata holds a `T` equal to `expected`.
    pub fn metadata_eq<T>(&self, expected: &T) -> bool
    where
        T: PartialEq + 'static,
    {
        self.state
            .load()
            .metadata
            .as_deref()
            .and_then(|any| any.downcast_ref::<T>())
            .is_some_and(|stored| stored == expected)
    }

    /// Instant the first sweep observed this generation of the record.
    pub fn create_timestamp(&self) -> Option<SystemTime> {
        match self.created_ms.load(Ordering::Acquire) {
            UNSTAMPED => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms as u64)),
        }
    }

    /// Age in whole seconds as of the last sweep.
    pub fn age_sec(&self) -> u32 {
        self.age_sec.load(Ordering::Relaxed)
    }

    /// Successful reads since the record was created or last reused.
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrites value and policy in place. Caller holds the stripe lock.
    ///
    /// Returns the displaced value so it can be disposed outside the lock.
    pub(crate) fn reuse(&self, value: Arc<V>, policy: &PutPolicy) -> Arc<V> {
        self.age_sec.store(0, Ordering::Relaxed);
        self.hit_count.store(0, Ordering::Relaxed);
        self.created_ms.store(UNSTAMPED, Ordering::Relaxed);
        let previous = self.state.swap(Arc::new(RecordState::new(value, policy)));
        Arc::clone(&previous.value)
    }

    /// Stamps or ages the record against `now_ms` and reports whether it expired.
    pub(crate) fn age(&self, now_ms: i64, default_max_age_sec: u32) -> Aging {
        let created = self.created_ms.load(Ordering::Acquire);
        if created == UNSTAMPED {
            let _ = self.created_ms.compare_exchange(
                UNSTAMPED,
                now_ms.max(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return Aging::Stamped;
        }
        let elapsed_ms = (now_ms - created).max(0);
        let age = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
        self.age_sec.store(age, Ordering::Relaxed);
        if self.expired_since(created, now_ms, default_max_age_sec) {
            Aging::Expired
        } else {
            Aging::Alive
        }
    }

    /// Re-evaluates expiry without stamping. Unstamped records never expire.
    pub(crate) fn is_expired(&self, now_ms: i64, default_max_age_sec: u32) -> bool {
        match self.created_ms.load(Ordering::Acquire) {
            UNSTAMPED => false,
            created => self.expired_since(created, now_ms, default_max_age_sec),
        }
    }

    fn expired_since(&self, created_ms: i64, now_ms: i64, default_max_age_sec: u32) -> bool {
        let state = self.state.load();
        let lifetime = if state.max_age_sec > 0 {
            state.max_age_sec
        } else {
            default_max_age_sec
        };
        if lifetime > 0 && now_ms - created_ms > i64::from(lifetime) * 1000 {
            return true;
        }
        state
            .absolute_expiration
            .is_some_and(|at| now_ms > unix_millis(at))
    }
}

impl<V: CacheValue> Record<V> {
    /// Disposes the current value, logging and swallowing failures.
    pub(crate) fn dispose_value(&self) {
        dispose(self.key, &*self.value());
    }
}

/// Runs `CacheValue::dispose`, logging instead of propagating errors.
pub(crate) fn dispose<V: CacheValue>(key: u64, value: &V) {
    if let Err(err) = value.dispose() {
        log::warn!(target: "tablecache::record", "dispose failed for key {key}: {err}");
    }
}

/// Milliseconds since the Unix epoch, saturating for pre-epoch instants.
pub(crate) fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl<V> fmt::Debug for Record<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load();
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("max_age_sec", &state.max_age_sec)
            .field("priority", &state.priority)
            .field("absolute_expiration", &state.absolute_expiration)
            .field("age_sec", &self.age_sec())
            .field("hit_count", &self.hit_count())
            .finish_non_exhaustive()
    }
}
