//! Turns usage records into metrics, log lines and notifications.

use log::{error, info};

use crate::metrics::MetricsRegistry;
use crate::notify::Notify;
use crate::usage::UsageRecord;

pub struct UsageSink {
    metrics: MetricsRegistry,
    notifier: Option<Box<dyn Notify>>,
}

impl UsageSink {
    pub fn new(metrics: MetricsRegistry, notifier: Option<Box<dyn Notify>>) -> Self {
        Self { metrics, notifier }
    }

    /// Publishes each record and returns the messages produced, in order.
    ///
    /// Both gauges are overwritten per record, so with several line items
    /// the last one is what the metrics endpoint shows.
    pub async fn process(&self, records: &[UsageRecord]) -> Vec<String> {
        let mut messages = Vec::with_capacity(records.len());

        for record in records {
            let used = record.used_percentage();
            self.metrics.usage_percent.set(used);
            self.metrics.remaining_gb.set(record.remaining);

            let message = format_message(record);
            info!("{}", message);

            if let Some(notifier) = &self.notifier {
                if let Err(e) = notifier.send(&message).await {
                    self.metrics.errors.inc();
                    error!("Notification failed: {}", e);
                }
            }

            messages.push(message);
        }

        messages
    }
}

/// `"<used>%, <remaining> GB remaining."`
pub fn format_message(record: &UsageRecord) -> String {
    format!(
        "{}%, {} GB remaining.",
        format_percentage(record.used_percentage()),
        record.remaining
    )
}

// Always keep one decimal: 75 -> "75.0", 33.33 -> "33.33".
fn format_percentage(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
