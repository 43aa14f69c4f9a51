use std::fmt::Write;

use super::types::{Counter, Gauge};

/// The monitor's metrics. Clones share the same underlying values, so the
/// poll loop and the `/metrics` endpoint can each hold one.
#[derive(Debug, Default, Clone)]
pub struct MetricsRegistry {
    pub queries: Counter,
    pub errors: Counter,
    pub usage_percent: Gauge,
    pub remaining_gb: Gauge,
    pub healthy: Gauge,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.set(if healthy { 1.0 } else { 0.0 });
    }

    /// Export metrics in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        write_metric(
            &mut output,
            "te_queries_total",
            "Total number of queries made",
            "counter",
            self.queries.get() as f64,
        );
        write_metric(
            &mut output,
            "te_errors_total",
            "Total number of errors",
            "counter",
            self.errors.get() as f64,
        );
        write_metric(
            &mut output,
            "te_data_usage_percent",
            "Current data usage percentage",
            "gauge",
            self.usage_percent.get(),
        );
        write_metric(
            &mut output,
            "te_data_remaining_gb",
            "Remaining data in GB",
            "gauge",
            self.remaining_gb.get(),
        );
        write_metric(
            &mut output,
            "te_healthy",
            "Whether the last query or health probe succeeded",
            "gauge",
            self.healthy.get(),
        );

        output
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, kind: &str, value: f64) {
    // Writing into a String cannot fail.
    let _ = write!(
        output,
        "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n"
    );
}
