//! Error taxonomy for the monitor.
//!
//! Startup code turns these into `anyhow::Error`; the poll loop matches on
//! them to decide whether a failure is fatal or waits for the next tick.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded or is unusable. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(
        "Credentials not provided. Pass --acct-id/--password or set TE_ACCOUNT_ID/TE_PASSWORD (a .env file works too)"
    )]
    MissingCredentials,
}

/// Network-level failure, reported as part of the operation that hit it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("HTTP {status} from upstream")]
    Status { status: u16 },

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Session is closed")]
    Closed,
}

impl TransportError {
    /// Connection resets, timeouts and 5xx are worth another attempt; the
    /// rest will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Request(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status } => *status >= 500,
            TransportError::Decode(_) | TransportError::Closed => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e)
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            TransportError::Decode(e)
        } else {
            TransportError::Request(e)
        }
    }
}

/// Login did not produce a usable session.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("Authentication failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication failed: response is missing `{0}`")]
    MissingField(&'static str),
}

impl AuthenticationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthenticationError::Transport(e) if e.is_transient())
    }
}

/// Usage query failed. Recovered by logging in again on the next tick.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Query rejected with HTTP {status}, session token likely expired")]
    Unauthorized { status: u16 },

    #[error("Query failed: unexpected response shape: {0}")]
    Malformed(String),
}

/// Notifier could not be run. Logged only.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Failed to start notifier `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to hand message to notifier: {0}")]
    Write(#[source] std::io::Error),
}
