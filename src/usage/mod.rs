//! Usage query client and the per-line usage record.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Session;
use crate::error::{QueryError, TransportError};
use crate::http::HttpSession;
use crate::throttle::Throttle;

const CSRF_TOKEN_HEADER: &str = "csrftoken";
const LANGUAGE_CODE_HEADER: &str = "languagecode";

/// Allowance for one subscription line item, in GB.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct UsageRecord {
    #[serde(default = "default_total")]
    pub total: f64,
    #[serde(rename = "remain", default)]
    pub remaining: f64,
}

fn default_total() -> f64 {
    1.0
}

impl UsageRecord {
    pub fn new(total: f64, remaining: f64) -> Self {
        Self { total, remaining }
    }

    /// Share of the allowance already used, rounded to two decimals.
    /// A non-positive total reports 0.0.
    pub fn used_percentage(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let used = (self.total - self.remaining) / self.total * 100.0;
        round2(used)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    subscriber_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    body: Option<serde_json::Value>,
}

impl QueryResponse {
    fn into_records(self) -> Result<Vec<UsageRecord>, QueryError> {
        let body = self
            .body
            .ok_or_else(|| QueryError::Malformed("missing `body`".to_string()))?;

        if !body.is_array() {
            return Err(QueryError::Malformed(format!(
                "`body` should be a list, got {}",
                json_kind(&body)
            )));
        }

        serde_json::from_value(body)
            .map_err(|e| QueryError::Malformed(format!("bad usage item: {}", e)))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryUsage: Send + Sync {
    /// Fetches the current usage line items for the session's subscriber.
    async fn query(&self, session: &Session) -> Result<Vec<UsageRecord>, QueryError>;
}

/// Queries the upstream usage endpoint.
pub struct UsageClient {
    http: Arc<HttpSession>,
    query_url: String,
    throttle: Throttle,
}

impl UsageClient {
    pub fn new(http: Arc<HttpSession>, query_url: impl Into<String>, throttle: Throttle) -> Self {
        Self {
            http,
            query_url: query_url.into(),
            throttle,
        }
    }

    fn headers(session: &Session) -> Result<HeaderMap, QueryError> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(session.token()).map_err(|_| {
            QueryError::Malformed("session token is not a valid header value".to_string())
        })?;
        headers.insert(HeaderName::from_static(CSRF_TOKEN_HEADER), token);
        headers.insert(
            HeaderName::from_static(LANGUAGE_CODE_HEADER),
            HeaderValue::from_static("en-US"),
        );
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        Ok(headers)
    }
}

#[async_trait]
impl QueryUsage for UsageClient {
    #[tracing::instrument(skip(self, session))]
    async fn query(&self, session: &Session) -> Result<Vec<UsageRecord>, QueryError> {
        let headers = Self::headers(session)?;
        self.throttle.acquire().await;

        let request = QueryRequest {
            subscriber_id: session.subscriber_id(),
        };
        let response: QueryResponse = self
            .http
            .post_json(&self.query_url, headers, &request)
            .await
            .map_err(|e| match e {
                TransportError::Status { status } if status == 401 || status == 403 => {
                    QueryError::Unauthorized { status }
                }
                other => QueryError::Transport(other),
            })?;

        let records = response.into_records()?;
        debug!("Received {} usage record(s)", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;
    use std::time::Duration;

    fn client(url: &str) -> UsageClient {
        UsageClient::new(
            Arc::new(HttpSession::new(Client::new())),
            format!("{}/query", url),
            Throttle::new("query", 100, Duration::from_secs(1)),
        )
    }

    fn session() -> Session {
        Session::new("csrf-123", "sub-456")
    }

    #[test]
    fn test_used_percentage() {
        assert_eq!(UsageRecord::new(100.0, 25.0).used_percentage(), 75.0);
        assert_eq!(UsageRecord::new(300.0, 200.0).used_percentage(), 33.33);
        assert_eq!(UsageRecord::new(3.0, 1.0).used_percentage(), 66.67);
        assert_eq!(UsageRecord::new(100.0, 100.0).used_percentage(), 0.0);
        assert_eq!(UsageRecord::new(100.0, 0.0).used_percentage(), 100.0);
    }

    #[test]
    fn test_used_percentage_exact_half_rounds_away_from_zero() {
        // 29 / 32 = 90.625 exactly
        assert_eq!(UsageRecord::new(32.0, 3.0).used_percentage(), 90.63);
    }

    #[test]
    fn test_used_percentage_zero_total() {
        assert_eq!(UsageRecord::new(0.0, 0.0).used_percentage(), 0.0);
        assert_eq!(UsageRecord::new(0.0, 5.0).used_percentage(), 0.0);
    }

    #[test]
    fn test_used_percentage_bounds_and_idempotence() {
        for total in [1.0, 7.0, 50.0, 140.0, 1000.0] {
            let mut remaining = 0.0;
            while remaining <= total {
                let record = UsageRecord::new(total, remaining);
                let first = record.used_percentage();
                assert!((0.0..=100.0).contains(&first), "{:?} -> {}", record, first);
                assert_eq!(first, record.used_percentage());
                remaining += total / 13.0;
            }
        }
    }

    #[test]
    fn test_record_defaults() {
        let record: UsageRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(record, UsageRecord::new(1.0, 0.0));

        let record: UsageRecord =
            serde_json::from_value(json!({"total": 150, "remain": 12.5, "unit": "GB"})).unwrap();
        assert_eq!(record, UsageRecord::new(150.0, 12.5));
    }

    #[tokio::test]
    async fn test_query_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_header("csrftoken", "csrf-123")
            .match_header("languagecode", "en-US")
            .match_body(Matcher::Json(json!({"subscriberId": "sub-456"})))
            .with_status(200)
            .with_body(r#"{"body": []}"#)
            .create_async()
            .await;

        let records = client(&server.url()).query(&session()).await.unwrap();
        mock.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_query_parses_records() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(200)
            .with_body(
                r#"{"body": [{"total": 100, "remain": 25}, {"total": 40.5, "remain": 10}]}"#,
            )
            .create_async()
            .await;

        let records = client(&server.url()).query(&session()).await.unwrap();
        assert_eq!(
            records,
            vec![UsageRecord::new(100.0, 25.0), UsageRecord::new(40.5, 10.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_are_throttled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .with_status(200)
            .with_body(r#"{"body": []}"#)
            .expect(2)
            .create_async()
            .await;

        let client = UsageClient::new(
            Arc::new(HttpSession::new(Client::new())),
            format!("{}/query", server.url()),
            Throttle::new("query", 1, Duration::from_secs(1)),
        );
        let start = tokio::time::Instant::now();

        client.query(&session()).await.unwrap();
        client.query(&session()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_unauthorized() {
        for status in [401, 403] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/query")
                .with_status(status)
                .create_async()
                .await;

            let result = client(&server.url()).query(&session()).await;
            match result {
                Err(QueryError::Unauthorized { status: s }) => assert_eq!(s as usize, status),
                other => panic!("Expected Unauthorized, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_query_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(500)
            .create_async()
            .await;

        let result = client(&server.url()).query(&session()).await;
        assert!(matches!(
            result,
            Err(QueryError::Transport(TransportError::Status { status: 500 }))
        ));
    }

    #[tokio::test]
    async fn test_query_malformed_body() {
        let cases = [
            r#"{}"#,
            r#"{"body": {"total": 1}}"#,
            r#"{"body": [{"total": "lots"}]}"#,
        ];
        for body in cases {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/query")
                .with_status(200)
                .with_body(body)
                .create_async()
                .await;

            let result = client(&server.url()).query(&session()).await;
            assert!(
                matches!(result, Err(QueryError::Malformed(_))),
                "body {} gave {:?}",
                body,
                result
            );
        }
    }

    #[tokio::test]
    async fn test_query_does_not_touch_session() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(401)
            .create_async()
            .await;

        let session = session();
        let before = session.clone();
        let _ = client(&server.url()).query(&session).await;
        assert_eq!(session, before);
    }
}
