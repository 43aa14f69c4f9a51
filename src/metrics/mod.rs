//! Metrics collection and export.
//!
//! The registry is an owned value handed to whoever updates or serves it;
//! there is no process-wide instance.

pub mod registry;
pub mod server;
pub mod types;

pub use registry::MetricsRegistry;
pub use types::{Counter, Gauge};
