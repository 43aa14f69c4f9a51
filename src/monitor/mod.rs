//! The poll loop: log in once, then query, publish and sleep until told to
//! stop, logging in again after a failed query.

use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticate, Session};
use crate::config::Config;
use crate::error::{AuthenticationError, QueryError};
use crate::http::{HttpSession, with_retry};
use crate::metrics::MetricsRegistry;
use crate::sink::UsageSink;
use crate::usage::{QueryUsage, UsageRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Authenticating,
    Polling,
    /// The last query failed; the next tick logs in again first.
    QueryFailed,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Polling => write!(f, "polling"),
            Self::QueryFailed => write!(f, "query failed"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub health_check_interval: Duration,
    /// Login attempts at startup before giving up.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            health_check_interval: config.health_check_interval(),
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
        }
    }
}

pub struct Monitor<A: Authenticate, Q: QueryUsage> {
    authenticator: A,
    client: Q,
    sink: UsageSink,
    metrics: MetricsRegistry,
    http: Arc<HttpSession>,
    settings: MonitorSettings,
    session: Option<Session>,
    state: MonitorState,
    is_healthy: bool,
    last_health_check: Instant,
}

impl<A: Authenticate, Q: QueryUsage> Monitor<A, Q> {
    pub fn new(
        authenticator: A,
        client: Q,
        sink: UsageSink,
        metrics: MetricsRegistry,
        http: Arc<HttpSession>,
        settings: MonitorSettings,
    ) -> Self {
        metrics.set_healthy(true);
        Self {
            authenticator,
            client,
            sink,
            metrics,
            http,
            settings,
            session: None,
            state: MonitorState::Starting,
            is_healthy: true,
            last_health_check: Instant::now(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Initial login. Without a session there is nothing to poll, so the
    /// error is returned to the caller after transient failures have been
    /// retried.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), AuthenticationError> {
        self.state = MonitorState::Authenticating;

        let authenticator = &self.authenticator;
        let metrics = &self.metrics;
        let result = with_retry(
            "Authentication",
            self.settings.retry_attempts,
            self.settings.retry_delay,
            || async move {
                let result = authenticator.authenticate().await;
                if result.is_err() {
                    metrics.errors.inc();
                }
                result
            },
        )
        .await;

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.state = MonitorState::Polling;
                self.last_health_check = Instant::now();
                Ok(())
            }
            Err(e) => {
                error!("Authentication failed: {}", e);
                self.session = None;
                Err(e)
            }
        }
    }

    /// Runs ticks until `shutdown` is cancelled, then releases the session.
    /// Cancellation is only observed between ticks.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Polling every {:?} (health check every {:?})",
            self.settings.poll_interval, self.settings.health_check_interval
        );

        while !shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.shutdown();
    }

    /// One poll cycle: re-login if the previous query failed, query, publish,
    /// and probe health when it is due. Never fails; errors are logged and
    /// counted.
    pub async fn tick(&mut self) {
        if self.session.is_none() || self.state == MonitorState::QueryFailed {
            if let Err(e) = self.reauthenticate().await {
                error!("Re-authentication failed, will try again next tick: {}", e);
                return;
            }
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };

        match self.client.query(session).await {
            Ok(records) => {
                self.metrics.queries.inc();
                self.publish(&records).await;
                self.state = MonitorState::Polling;
                self.set_healthy(true);

                if self.last_health_check.elapsed() >= self.settings.health_check_interval {
                    self.health_check().await;
                }
            }
            Err(e) => {
                self.metrics.errors.inc();
                self.record_query_failure(&e);
            }
        }
    }

    /// Stops polling and releases the network session. No request can be
    /// made afterwards.
    pub fn shutdown(&mut self) {
        if self.state == MonitorState::Terminated {
            return;
        }
        info!("Shutting down...");
        self.state = MonitorState::ShuttingDown;
        self.session = None;
        self.http.close();
        self.state = MonitorState::Terminated;
    }

    async fn reauthenticate(&mut self) -> Result<(), AuthenticationError> {
        self.state = MonitorState::Authenticating;
        // Replaced wholesale; a failed login leaves no session at all.
        self.session = None;

        match self.authenticator.authenticate().await {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.metrics.errors.inc();
                self.state = MonitorState::QueryFailed;
                Err(e)
            }
        }
    }

    async fn publish(&self, records: &[UsageRecord]) {
        if records.is_empty() {
            warn!("Usage query returned no line items");
            return;
        }
        self.sink.process(records).await;
    }

    /// Repeats the query only to refresh the liveness flag.
    async fn health_check(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        debug!("Running health check");

        match self.client.query(session).await {
            Ok(_) => {
                self.metrics.queries.inc();
                self.set_healthy(true);
                self.last_health_check = Instant::now();
            }
            Err(e) => {
                self.metrics.errors.inc();
                self.set_healthy(false);
                error!("Health check failed: {}", e);
            }
        }
    }

    fn record_query_failure(&mut self, e: &QueryError) {
        error!("Query failed: {}", e);
        self.set_healthy(false);
        self.state = MonitorState::QueryFailed;
    }

    fn set_healthy(&mut self, healthy: bool) {
        self.is_healthy = healthy;
        self.metrics.set_healthy(healthy);
    }
}
