//! Start-up use case: wires configuration, the HTTP session, the metrics
//! endpoint and the poll loop together, then runs until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, Credentials};
use crate::config::Config;
use crate::error::ConfigError;
use crate::http::HttpSession;
use crate::metrics::{self, MetricsRegistry};
use crate::monitor::{Monitor, MonitorSettings};
use crate::notify::{CommandNotifier, Notify};
use crate::runtime::Runtime;
use crate::sink::UsageSink;
use crate::throttle::Throttle;
use crate::usage::UsageClient;

/// Values given on the command line (or through their environment
/// variables). Anything set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub config_path: PathBuf,
    pub interval: Option<u64>,
    pub account_id: Option<String>,
    pub password: Option<String>,
    pub notify_id: Option<String>,
    pub metrics_port: Option<u16>,
}

impl MonitorOptions {
    /// Both account id and password must be present and non-empty.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match (non_empty(&self.account_id), non_empty(&self.password)) {
            (Some(account_id), Some(password)) => Ok(Credentials::new(account_id, password)),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(interval) = self.interval {
            config.rate_limit = interval;
        }
        if let Some(id) = self.notify_id.as_ref().filter(|id| !id.is_empty()) {
            config.notify_id = Some(id.clone());
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        config.validate()
    }
}

/// Loads configuration, logs in, and polls until `shutdown` is cancelled.
///
/// Returns an error for missing credentials, a bad config file, an unusable
/// metrics port, or a failed initial login. A shutdown requested at any
/// point ends with `Ok(())`.
#[tracing::instrument(skip(runtime, options, shutdown))]
pub async fn run_monitor<R: Runtime>(
    runtime: &R,
    options: MonitorOptions,
    shutdown: CancellationToken,
) -> Result<()> {
    let credentials = options.credentials()?;

    let mut config = Config::load(runtime, &options.config_path)?;
    options.apply_overrides(&mut config)?;
    debug!("Effective config: {:?}", config);

    let http = Arc::new(HttpSession::from_config(&config)?);
    let metrics = MetricsRegistry::new();

    let authenticator = Authenticator::new(
        http.clone(),
        config.login_url.clone(),
        credentials,
        Throttle::from_config("login", &config.throttle),
    );
    let client = UsageClient::new(
        http.clone(),
        config.query_url.clone(),
        Throttle::from_config("query", &config.throttle),
    );

    let notifier = config.notify_id.as_ref().map(|id| {
        info!("Notifications go to {:?} via `{}`", id, config.notify_command);
        let notifier = CommandNotifier::new(config.notify_command.clone(), id.clone());
        Box::new(notifier) as Box<dyn Notify>
    });
    let sink = UsageSink::new(metrics.clone(), notifier);

    let listener = metrics::server::bind(config.metrics_port).await?;
    let server_shutdown = shutdown.child_token();
    let server = tokio::spawn(metrics::server::serve(
        listener,
        metrics.clone(),
        server_shutdown.clone(),
    ));

    let mut monitor = Monitor::new(
        authenticator,
        client,
        sink,
        metrics,
        http,
        MonitorSettings::from(&config),
    );

    let started = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        result = monitor.start() => Some(result),
    };

    let result = match started {
        Some(Ok(())) => {
            monitor.run(shutdown).await;
            Ok(())
        }
        Some(Err(e)) => Err(e).context("Initial authentication failed"),
        None => Ok(()),
    };

    monitor.shutdown();
    server_shutdown.cancel();
    server
        .await
        .context("Metrics server task failed")?
        .context("Metrics server stopped with an error")?;

    result
}
