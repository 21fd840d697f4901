//! Retrying, rate-limited request execution shared by all connectors

use crate::clock::Clock;
use crate::error::HarvestError;
use crate::retry::RetryPolicy;
use crate::transport::JsonTransport;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Wraps a transport with the retry policy and the inter-request sleep
///
/// Each call is retried while it fails with a retryable error, waiting
/// `policy.delay(attempt)` between attempts. Parsing happens inside the
/// retried call, so a malformed body is retried like a 503.
pub struct PageFetcher {
    transport: Arc<dyn JsonTransport>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    request_interval: Duration,
    started: AtomicBool,
}

impl PageFetcher {
    /// Create a fetcher
    pub fn new(transport: Arc<dyn JsonTransport>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            clock,
            retry,
            request_interval: Duration::ZERO,
            started: AtomicBool::new(false),
        }
    }

    /// Sleep this long before every request but the first
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    /// The clock used for sleeps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// GET a JSON document and parse it
    pub async fn get<T, F>(&self, url: &str, query: &[(String, String)], parse: F) -> Result<T, HarvestError>
    where
        F: Fn(Value) -> Result<T, HarvestError> + Sync,
    {
        let transport = &self.transport;
        let parse = &parse;
        self.call("GET", url, || async move { parse(transport.get(url, query).await?) })
            .await
    }

    /// POST a JSON body and parse the reply
    pub async fn post<T, F>(&self, url: &str, body: &Value, parse: F) -> Result<T, HarvestError>
    where
        F: Fn(Value) -> Result<T, HarvestError> + Sync,
    {
        let transport = &self.transport;
        let parse = &parse;
        self.call("POST", url, || async move { parse(transport.post(url, body).await?) })
            .await
    }

    /// GET a text body and parse it
    pub async fn get_text<T, F>(&self, url: &str, parse: F) -> Result<T, HarvestError>
    where
        F: Fn(String) -> Result<T, HarvestError> + Sync,
    {
        let transport = &self.transport;
        let parse = &parse;
        self.call("GET", url, || async move { parse(transport.get_text(url).await?) })
            .await
    }

    /// DELETE a resource
    pub async fn delete(&self, url: &str) -> Result<(), HarvestError> {
        let transport = &self.transport;
        self.call("DELETE", url, || async move { transport.delete(url).await })
            .await
    }

    async fn call<T, F, Fut>(&self, method: &str, url: &str, op: F) -> Result<T, HarvestError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.throttle().await;
            debug!("{} {} (attempt {})", method, url, attempt + 1);

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "{} {} failed ({}), retrying in {:.1}s",
                        method,
                        url,
                        e,
                        delay.as_secs_f64()
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(HarvestError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn throttle(&self) {
        let already_started = self.started.swap(true, Ordering::Relaxed);
        if already_started && !self.request_interval.is_zero() {
            self.clock.sleep(self.request_interval).await;
        }
    }
}

/// Read a JSON pointer as an array of objects
pub fn array_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a Vec<Value>, HarvestError> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| HarvestError::malformed(format!("no array at '{}'", pointer)))
}

/// Read a JSON pointer as an unsigned integer (numbers or numeric strings)
pub fn u64_at(value: &Value, pointer: &str) -> Result<u64, HarvestError> {
    match value.pointer(pointer) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| HarvestError::malformed(format!("no unsigned integer at '{}'", pointer)))
}

/// Read a JSON pointer as a non-empty string (numbers are rendered)
pub fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
