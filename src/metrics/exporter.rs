use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{StoreMetricsSnapshot, TableMetricsSnapshot};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for table and store snapshots.
///
/// Writes the Prometheus text exposition format, labelling every sample with
/// `store` (and `table` for table snapshots), so the output can be scraped or
/// forwarded to an OpenTelemetry collector. Write failures are ignored:
/// instrumentation must never disturb the maintenance cycle.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the exporter and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_sample(&self, kind: &str, suffix: &str, labels: &str, value: impl std::fmt::Display) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{}{{{}}} {}", name, labels, value);
    }

    fn write_counter(&self, suffix: &str, labels: &str, value: u64) {
        self.write_sample("counter", suffix, labels, value);
    }

    fn write_gauge(&self, suffix: &str, labels: &str, value: impl std::fmt::Display) {
        self.write_sample("gauge", suffix, labels, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl<W: Write + Send> MetricsExporter<TableMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &TableMetricsSnapshot) {
        let labels = format!(
            "store=\"{}\",table=\"{}\"",
            escape_label(&snapshot.store),
            escape_label(&snapshot.table)
        );
        let c = &snapshot.counters;
        self.write_counter("table_hits_total", &labels, c.hits);
        self.write_counter("table_misses_total", &labels, c.misses);
        self.write_counter("table_complex_hits_total", &labels, c.complex_hits);
        self.write_counter("table_complex_misses_total", &labels, c.complex_misses);
        self.write_counter("table_inserts_total", &labels, c.inserts);
        self.write_counter("table_replaces_total", &labels, c.replaces);
        self.write_counter("table_collisions_total", &labels, c.collisions);
        self.write_counter(
            "table_priority_prevented_collisions_total",
            &labels,
            c.priority_prevented_collisions,
        );
        self.write_counter("table_page_creates_total", &labels, c.page_creates);
        self.write_counter("table_page_removes_total", &labels, c.page_removes);
        self.write_counter("table_sweep_pages_total", &labels, c.sweep_pages);
        self.write_counter("table_sweep_removes_total", &labels, c.sweep_removes);
        self.write_gauge("table_records", &labels, snapshot.record_count);
        self.write_gauge("table_pages", &labels, snapshot.page_count);
        self.write_gauge("table_capacity", &labels, snapshot.capacity);
        self.write_gauge(
            "table_bucket_page_load_factor",
            &labels,
            snapshot.bucket_page_load_factor(),
        );
    }
}

impl<W: Write + Send> MetricsExporter<StoreMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &StoreMetricsSnapshot) {
        let labels = format!("store=\"{}\"", escape_label(&snapshot.store));
        self.write_counter("store_sweep_cycles_total", &labels, snapshot.sweep_cycles);
        self.write_counter("store_sweep_tables_total", &labels, snapshot.sweep_tables);
        self.write_counter("store_failed_cycles_total", &labels, snapshot.failed_cycles);
        self.write_counter("store_hits_total", &labels, snapshot.totals.hits);
        self.write_counter("store_misses_total", &labels, snapshot.totals.misses);
        self.write_counter(
            "store_sweep_removes_total",
            &labels,
            snapshot.totals.sweep_removes,
        );
        self.write_gauge("store_tables", &labels, snapshot.table_count);
        self.write_gauge("store_records", &labels, snapshot.record_count);
        self.write_gauge("store_pages", &labels, snapshot.page_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::counters::CounterValues;

    #[test]
    fn table_snapshot_renders_labelled_samples() {
        let exporter = PrometheusTextExporter::new("tablecache", Vec::new());
        exporter.export(&TableMetricsSnapshot {
            store: "main".into(),
            table: "orders".into(),
            counters: CounterValues {
                hits: 12,
                ..CounterValues::default()
            },
            record_count: 3,
            page_count: 1,
            bucket_count: 4,
            capacity: 12,
        });

        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("# TYPE tablecache_table_hits_total counter"));
        assert!(text.contains("tablecache_table_hits_total{store=\"main\",table=\"orders\"} 12"));
        assert!(text.contains("tablecache_table_records{store=\"main\",table=\"orders\"} 3"));
        assert!(
            text.contains("tablecache_table_bucket_page_load_factor{store=\"main\",table=\"orders\"} 0.25")
        );
    }

    #[test]
    fn store_snapshot_without_prefix() {
        let exporter = PrometheusTextExporter::new("", Vec::new());
        exporter.export(&StoreMetricsSnapshot {
            store: "s".into(),
            sweep_cycles: 2,
            table_count: 1,
            ..StoreMetricsSnapshot::default()
        });

        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("store_sweep_cycles_total{store=\"s\"} 2"));
        assert!(text.contains("store_tables{store=\"s\"} 1"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("a\"b\\c"), "a\\\"b\\\\c");
    }
}
