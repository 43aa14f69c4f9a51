//! Account login.
//!
//! A successful login yields a [`Session`]: the CSRF token the query
//! endpoint expects in its `Csrftoken` header plus the subscriber id. The
//! cookies set during login live in the shared [`HttpSession`].

use async_trait::async_trait;
use log::info;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::AuthenticationError;
use crate::http::HttpSession;
use crate::throttle::Throttle;

/// Prefix the upstream expects in front of fixed broadband account ids.
const ACCOUNT_PREFIX: &str = "FBB";

/// Account id and password, fixed for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("password", &"********")
            .finish()
    }
}

/// A fully authenticated session. Never constructed with missing parts.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    subscriber_id: String,
}

impl Session {
    pub fn new(token: impl Into<String>, subscriber_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            subscriber_id: subscriber_id.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"********")
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    acct_id: String,
    password: &'a str,
    app_locale: &'static str,
    is_selfcare: &'static str,
    is_mobile: &'static str,
    recaptcha_token: &'static str,
}

impl<'a> LoginRequest<'a> {
    fn new(credentials: &'a Credentials) -> Self {
        Self {
            acct_id: format!("{}{}", ACCOUNT_PREFIX, credentials.account_id),
            password: &credentials.password,
            app_locale: "en-US",
            is_selfcare: "Y",
            is_mobile: "N",
            recaptcha_token: "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    body: Option<LoginBody>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: Option<String>,
    subscriber: Option<Subscriber>,
}

#[derive(Debug, Deserialize)]
struct Subscriber {
    #[serde(rename = "subscriberId")]
    subscriber_id: Option<serde_json::Value>,
}

impl LoginResponse {
    fn into_session(self) -> Result<Session, AuthenticationError> {
        let body = self.body.ok_or(AuthenticationError::MissingField("body"))?;

        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or(AuthenticationError::MissingField("body.token"))?;

        let subscriber_id = body
            .subscriber
            .and_then(|s| s.subscriber_id)
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|id| !id.is_empty())
            .ok_or(AuthenticationError::MissingField(
                "body.subscriber.subscriberId",
            ))?;

        Ok(Session::new(token, subscriber_id))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Logs in and returns a fresh session.
    async fn authenticate(&self) -> Result<Session, AuthenticationError>;
}

/// Logs in against the upstream login endpoint.
pub struct Authenticator {
    http: Arc<HttpSession>,
    login_url: String,
    credentials: Credentials,
    throttle: Throttle,
}

impl Authenticator {
    pub fn new(
        http: Arc<HttpSession>,
        login_url: impl Into<String>,
        credentials: Credentials,
        throttle: Throttle,
    ) -> Self {
        Self {
            http,
            login_url: login_url.into(),
            credentials,
            throttle,
        }
    }
}

#[async_trait]
impl Authenticate for Authenticator {
    #[tracing::instrument(skip(self))]
    async fn authenticate(&self) -> Result<Session, AuthenticationError> {
        self.throttle.acquire().await;

        let request = LoginRequest::new(&self.credentials);
        let response: LoginResponse = self
            .http
            .post_json(&self.login_url, HeaderMap::new(), &request)
            .await?;

        let session = response.into_session()?;
        info!("Successfully authenticated");
        Ok(session)
    }
}
