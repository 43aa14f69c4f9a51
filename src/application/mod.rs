//! Application layer - use cases called from the CLI.

mod start;

pub use start::{MonitorOptions, run_monitor};
