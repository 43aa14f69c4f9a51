//! Self-imposed rate limiting for outbound calls.
//!
//! A fixed-window limiter: at most `max_calls` acquisitions per `period`.
//! When the window is spent, `acquire` sleeps until the next window opens
//! instead of failing.

use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{MAX_DURATION_SECS, ThrottleConfig};

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window call throttle. One instance guards one call site.
#[derive(Debug)]
pub struct Throttle {
    name: &'static str,
    max_calls: u32,
    period: Duration,
    window: Mutex<Option<Window>>,
}

impl Throttle {
    pub fn new(name: &'static str, max_calls: u32, period: Duration) -> Self {
        Self {
            name,
            max_calls: max_calls.max(1),
            period: period.min(Duration::from_secs(MAX_DURATION_SECS)),
            window: Mutex::new(None),
        }
    }

    pub fn from_config(name: &'static str, config: &ThrottleConfig) -> Self {
        Self::new(name, config.calls, config.period())
    }

    /// Waits until a call is allowed, then records it.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        match window.as_mut() {
            Some(w) if now.duration_since(w.started) < self.period => {
                if w.used < self.max_calls {
                    w.used += 1;
                    return;
                }

                let open_at = w.started + self.period;
                debug!(
                    "{}: {} calls per {:?} reached, waiting {:?}",
                    self.name,
                    self.max_calls,
                    self.period,
                    open_at.saturating_duration_since(now)
                );
                // Holding the lock while sleeping keeps waiters in order.
                tokio::time::sleep_until(open_at).await;
                *window = Some(Window {
                    started: open_at,
                    used: 1,
                });
            }
            _ => {
                *window = Some(Window {
                    started: now,
                    used: 1,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_calls_within_budget_do_not_wait() {
        let throttle = Throttle::new("test", 2, Duration::from_secs(1));
        let start = Instant::now();

        throttle.acquire().await;
        throttle.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_over_budget_waits_for_next_window() {
        let throttle = Throttle::new("test", 1, Duration::from_secs(1));
        let start = Instant::now();

        throttle.acquire().await;
        throttle.acquire().await;

        assert_eq!(start.elapsed(), Duration::from_secs(1));

        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_period() {
        let throttle = Throttle::new("test", 1, Duration::from_secs(1));

        throttle.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_period_is_capped() {
        let throttle = Throttle::new("test", 1, Duration::MAX);
        let start = Instant::now();

        throttle.acquire().await;
        throttle.acquire().await;

        assert_eq!(start.elapsed(), Duration::from_secs(MAX_DURATION_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let throttle = Throttle::from_config(
            "test",
            &ThrottleConfig {
                calls: 3,
                period: 10,
            },
        );
        let start = Instant::now();
        for _ in 0..3 {
            throttle.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
