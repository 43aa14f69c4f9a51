//! Delivery of usage messages to an external notifier program.

use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::NotificationError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotificationError>;
}

/// Runs `<command> -silent -id <destination>` and writes the message to its
/// stdin. Output is discarded and the exit status is only logged.
pub struct CommandNotifier {
    command: String,
    destination: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl Notify for CommandNotifier {
    #[tracing::instrument(skip(self, message))]
    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        let mut child = Command::new(&self.command)
            .args(["-silent", "-id", &self.destination])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NotificationError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(NotificationError::Write)?;
            // Dropping stdin closes the pipe so the notifier sees EOF.
        }

        match child.wait().await {
            Ok(status) => debug!("Notifier exited with {}", status),
            Err(e) => debug!("Failed to wait for notifier: {}", e),
        }
        Ok(())
    }
}
