//! JSON-over-HTTP transport
//!
//! Connectors never touch `reqwest` directly. They go through a
//! [`JsonTransport`], which classifies failures as transient (retry) or
//! provider errors (fatal for the unit).

use crate::error::HarvestError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Default timeout for a single request (30 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Minimal JSON request interface used by every connector
#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// GET a JSON document
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Value, HarvestError>;

    /// POST a JSON body and read a JSON document back
    async fn post(&self, url: &str, body: &Value) -> Result<Value, HarvestError>;

    /// DELETE a resource
    async fn delete(&self, url: &str) -> Result<(), HarvestError>;

    /// GET a body as text (bulk archives)
    async fn get_text(&self, url: &str) -> Result<String, HarvestError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gleaner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, HarvestError> {
        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = format!("HTTP {}: {}", status, truncate(&body, 200));
        if is_transient_status(status.as_u16()) {
            Err(HarvestError::Transient(message))
        } else {
            Err(HarvestError::Provider(message))
        }
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Value, HarvestError> {
        let response = self.send(self.client.get(url).query(query)).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| HarvestError::malformed(format!("GET {}: {}", url, e)))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, HarvestError> {
        let response = self.send(self.client.post(url).json(body)).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| HarvestError::malformed(format!("POST {}: {}", url, e)))
    }

    async fn delete(&self, url: &str) -> Result<(), HarvestError> {
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_text(&self, url: &str) -> Result<String, HarvestError> {
        let response = self.send(self.client.get(url)).await?;
        response
            .text()
            .await
            .map_err(|e| HarvestError::Transient(format!("GET {}: {}", url, e)))
    }
}

/// 429 and every 5xx are worth retrying
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn classify_request_error(e: reqwest::Error) -> HarvestError {
    if e.is_builder() {
        HarvestError::Config(format!("Invalid request: {}", e))
    } else {
        HarvestError::Transient(format!("Request failed: {}", e))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// A request seen by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: &'static str,
    /// Target URL
    pub url: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body, for POST
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// Value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport replaying canned responses in order, for tests and dry runs
///
/// `get_text` expects the scripted value to be a JSON string. `delete`
/// consumes a response too; any `Ok` value counts as success.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value, HarvestError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn respond(self, value: Value) -> Self {
        self.push(Ok(value));
        self
    }

    /// Queue a failure
    pub fn fail(self, error: HarvestError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queue a response after construction
    pub fn push(&self, response: Result<Value, HarvestError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Requests made so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next(&self, request: RecordedRequest) -> Result<Value, HarvestError> {
        let description = format!("{} {}", request.method, request.url);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(HarvestError::Provider(format!("no scripted response for {}", description))))
    }
}

#[async_trait]
impl JsonTransport for ScriptedTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Value, HarvestError> {
        self.next(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            query: query.to_vec(),
            body: None,
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, HarvestError> {
        self.next(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            query: Vec::new(),
            body: Some(body.clone()),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), HarvestError> {
        self.next(RecordedRequest {
            method: "DELETE",
            url: url.to_string(),
            query: Vec::new(),
            body: None,
        })
        .map(|_| ())
    }

    async fn get_text(&self, url: &str) -> Result<String, HarvestError> {
        match self.next(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            query: Vec::new(),
            body: None,
        })? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(429));
        assert!(is_transient_status(503));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(400));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("für immer", 2), "fü");
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new()
            .respond(json!({"n": 1}))
            .fail(HarvestError::Transient("503".into()));

        let first = transport.get("http://x/a", &[("page".into(), "1".into())]).await.unwrap();
        assert_eq!(first["n"], 1);
        assert!(transport.get("http://x/a", &[]).await.is_err());
        assert!(matches!(transport.delete("http://x/a").await, Err(HarvestError::Provider(_))));

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].param("page"), Some("1"));
    }
}
