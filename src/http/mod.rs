//! HTTP session wrapper and retry helpers for upstream calls.

mod client;
mod retry;

pub use client::HttpSession;
pub use retry::{Transient, with_retry};
