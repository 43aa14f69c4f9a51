//! Monitor configuration loaded from a YAML file.

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::runtime::Runtime;

/// Settings read once at startup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub login_url: String,
    pub query_url: String,

    /// Static headers sent with every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Seconds to sleep between polls.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Seconds between health probes.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    /// Startup login attempts on transient failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Seconds between startup login attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub notify_id: Option<String>,

    #[serde(default = "default_notify_command")]
    pub notify_command: String,

    #[serde(default)]
    pub throttle: ThrottleConfig,
}

/// At most `calls` outbound calls per `period` seconds, per call site.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_calls")]
    pub calls: u32,
    #[serde(default = "default_throttle_period")]
    pub period: u64,
}

impl ThrottleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            calls: default_throttle_calls(),
            period: default_throttle_period(),
        }
    }
}

/// Upper bound for every duration setting: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

fn default_rate_limit() -> u64 {
    4000
}
fn default_metrics_port() -> u16 {
    8000
}
fn default_health_check_interval() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    30
}
fn default_notify_command() -> String {
    "notify".to_string()
}
fn default_throttle_calls() -> u32 {
    1
}
fn default_throttle_period() -> u64 {
    1
}

impl Config {
    /// Reads and validates the config file at `path`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self, ConfigError> {
        if !runtime.exists(path) {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("file does not exist"),
            });
        }

        let content = runtime
            .read_to_string(path)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parses and validates YAML config text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: Default::default(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("login_url", &self.login_url)?;
        validate_url("query_url", &self.query_url)?;

        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_limit",
                reason: "poll interval must be at least 1 second".to_string(),
            });
        }
        if self.throttle.calls == 0 || self.throttle.period == 0 {
            return Err(ConfigError::Invalid {
                key: "throttle",
                reason: "calls and period must both be greater than zero".to_string(),
            });
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout",
                reason: "must be at least 1 second".to_string(),
            });
        }
        for (key, secs) in [
            ("rate_limit", self.rate_limit),
            ("health_check_interval", self.health_check_interval),
            ("retry_delay", self.retry_delay),
            ("request_timeout", self.request_timeout),
            ("throttle", self.throttle.period),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("{} seconds is longer than a year", secs),
                });
            }
        }
        if self.notify_command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "notify_command",
                reason: "must not be empty".to_string(),
            });
        }

        self.header_map()?;
        Ok(())
    }

    /// Static headers as a reqwest header map.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Invalid {
                    key: "headers",
                    reason: format!("bad header name {:?}: {}", name, e),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
                key: "headers",
                reason: format!("bad value for header {:?}: {}", name.as_str(), e),
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn validate_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{:?} is not a valid URL: {}", value, e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme {:?}", scheme),
        }),
    }
}
