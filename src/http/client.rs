//! Cookie-holding HTTP session shared by the login and query calls.

use log::debug;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::RwLock;

use crate::config::Config;
use crate::error::{ConfigError, TransportError};

/// Owns the network identity (connection pool and cookie jar) for the
/// lifetime of the monitor. Once closed, every request fails with
/// [`TransportError::Closed`].
pub struct HttpSession {
    client: RwLock<Option<Client>>,
}

impl HttpSession {
    /// Creates a session wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    /// Builds a session with a cookie store, the configured static headers
    /// and the configured request timeout.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(config.header_map()?)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "headers",
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self::new(client))
    }

    /// Performs a POST with a JSON body and deserializes the JSON response.
    /// Non-2xx statuses fail with [`TransportError::Status`].
    #[tracing::instrument(skip(self, headers, body))]
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let client = self.client()?;
        debug!("POST JSON to {}...", url);

        let response = client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(TransportError::from)?;

        let response = response.error_for_status().map_err(TransportError::from)?;

        response
            .json::<T>()
            .await
            .map_err(TransportError::Decode)
    }

    /// Releases the connection pool and cookies.
    pub fn close(&self) {
        let mut client = self.client.write().unwrap_or_else(|e| e.into_inner());
        if client.take().is_some() {
            debug!("HTTP session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    fn client(&self) -> Result<Client, TransportError> {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(TransportError::Closed)
    }
}
