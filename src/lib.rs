pub mod application;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod runtime;
pub mod sink;
pub mod throttle;
pub mod usage;
