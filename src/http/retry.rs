//! Retry logic for startup operations with error classification.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{AuthenticationError, TransportError};

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for TransportError {
    fn is_transient(&self) -> bool {
        TransportError::is_transient(self)
    }
}

impl Transient for AuthenticationError {
    fn is_transient(&self) -> bool {
        AuthenticationError::is_transient(self)
    }
}

/// Executes an async operation up to `attempts` times, sleeping `delay`
/// between attempts. Errors that are not transient fail immediately.
pub async fn with_retry<F, Fut, T, E>(
    operation_name: &str,
    attempts: u32,
    delay: Duration,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => {
                debug!("{}: non-retryable error: {}", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                    operation_name, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
