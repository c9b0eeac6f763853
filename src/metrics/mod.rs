pub mod counters;
#[cfg(feature = "metrics")]
pub mod exporter;
pub mod snapshot;
pub mod traits;

pub use counters::{CounterValues, StoreCounters, TableCounters};
#[cfg(feature = "metrics")]
pub use exporter::PrometheusTextExporter;
pub use snapshot::{StoreMetricsSnapshot, TableMetricsSnapshot};
pub use traits::{Instrumentation, MetricsExporter, MetricsSnapshotProvider};
