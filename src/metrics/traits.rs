//! # Metrics Trait Hierarchy
//!
//! Recording, snapshotting and export are separate concerns:
//!
//! ```text
//!   hot path                        maintenance thread
//!   ────────                        ──────────────────
//!   TableCounters::inc_*  ──────►   TableCounters::take()   (read-and-reset)
//!                                          │
//!                                          ▼
//!                                   TableMetricsSnapshot / StoreMetricsSnapshot
//!                                          │
//!                                          ▼
//!                                   dyn Instrumentation  (MetricsExporter<S> for both)
//! ```
//!
//! - [`MetricsSnapshotProvider`] reads current totals without resetting; used
//!   by tests and ad-hoc inspection.
//! - [`MetricsExporter`] publishes a snapshot to a monitoring backend.
//! - [`Instrumentation`] is the object-safe sink a store holds: anything that
//!   can export both table and store snapshots.

use crate::metrics::snapshot::{StoreMetricsSnapshot, TableMetricsSnapshot};

/// Snapshot provider for inspection and tests.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}

/// Sink the maintenance thread publishes to after every cycle.
pub trait Instrumentation:
    MetricsExporter<TableMetricsSnapshot> + MetricsExporter<StoreMetricsSnapshot> + Send + Sync
{
}

impl<T> Instrumentation for T where
    T: MetricsExporter<TableMetricsSnapshot>
        + MetricsExporter<StoreMetricsSnapshot>
        + Send
        + Sync
{
}
