use crate::metrics::counters::CounterValues;

/// Counters and gauges for one table.
///
/// Counters are deltas since the previous publish when produced by the
/// maintenance thread, and running totals when produced by
/// [`Table::metrics`](crate::table::Table::metrics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableMetricsSnapshot {
    pub store: String,
    pub table: String,
    pub counters: CounterValues,

    // gauges captured at snapshot time
    pub record_count: usize,
    pub page_count: usize,
    pub bucket_count: usize,
    pub capacity: usize,
}

impl TableMetricsSnapshot {
    /// Fraction of buckets that have been promoted to a collision page.
    pub fn bucket_page_load_factor(&self) -> f64 {
        if self.bucket_count == 0 {
            return 0.0;
        }
        self.page_count as f64 / self.bucket_count as f64
    }
}

/// Aggregated counters for a whole store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreMetricsSnapshot {
    pub store: String,
    pub sweep_cycles: u64,
    pub sweep_tables: u64,
    pub failed_cycles: u64,
    /// Sum of the table counters included in the same publish.
    pub totals: CounterValues,

    pub table_count: usize,
    pub record_count: usize,
    pub page_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_factor_is_pages_over_buckets() {
        let snapshot = TableMetricsSnapshot {
            page_count: 5,
            bucket_count: 20,
            ..TableMetricsSnapshot::default()
        };
        assert!((snapshot.bucket_page_load_factor() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn load_factor_of_empty_geometry_is_zero() {
        assert_eq!(TableMetricsSnapshot::default().bucket_page_load_factor(), 0.0);
    }
}
