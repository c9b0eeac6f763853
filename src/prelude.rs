pub use crate::builder::StoreBuilder;
pub use crate::complex::{
    ComplexKeyAdapter, HashProjector, KeyProjector, MAX_CHAIN_LENGTH, SuffixProjector,
};
pub use crate::error::{CacheError, ConfigError, DisposeError, InvariantError};
#[cfg(feature = "metrics")]
pub use crate::metrics::PrometheusTextExporter;
pub use crate::metrics::{
    Instrumentation, MetricsExporter, MetricsSnapshotProvider, StoreMetricsSnapshot,
    TableMetricsSnapshot,
};
pub use crate::options::{StoreOptions, TableOptions};
pub use crate::store::{CycleStats, Store};
pub use crate::table::{PutOutcome, PutPolicy, PutResult, Record, Table};
pub use crate::traits::CacheValue;
