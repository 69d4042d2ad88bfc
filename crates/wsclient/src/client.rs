//! The workspace client with its rate-limit retry policy.

use crate::error::{Error, Result};
use crate::pager::Pages;
use crate::response::ApiResponse;
use crate::transport::{ApiRequest, HttpTransport, Method, Transport};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How throttled calls are retried.
///
/// Only status 429 is retried. Everything else, error payloads included, is
/// returned to the caller on the first answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit, multiplied by the retry number.
    pub base_delay: Duration,
    /// Upper bound of the random delay added to each wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry `attempt` (0-indexed): `base * (attempt + 1) + random(jitter)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..=jitter_ms)
        };
        self.base_delay * (attempt + 1) + Duration::from_millis(jitter)
    }
}

/// Shared, read-only handle to the workspace API.
#[derive(Clone)]
pub struct WorkspaceClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl WorkspaceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Client over HTTP with a bearer token.
    pub fn http(host: &str, token: &str, timeout: Duration) -> Self {
        Self::new(Arc::new(HttpTransport::new(host, token, timeout)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request, retrying while the workspace answers 429.
    ///
    /// When retries are exhausted the last 429 response is returned as a value.
    pub fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let request = ApiRequest {
            method,
            path: clean_path(path)?,
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: body.cloned(),
        };

        let mut attempt = 0;
        loop {
            let raw = self.transport.send(&request)?;
            log::debug!(
                "{} {} -> {} (attempt {})",
                request.method,
                request.path,
                raw.status,
                attempt + 1
            );
            let response = ApiResponse::new(&request.path, raw.status, raw.body);

            if !response.is_rate_limited() || attempt >= self.retry.max_retries {
                return Ok(response);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            log::info!(
                "{} {} was rate limited, retrying in {}ms ({}/{})",
                request.method,
                request.path,
                delay.as_millis(),
                attempt + 1,
                self.retry.max_retries
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        self.call(Method::Get, path, query, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.call(Method::Post, path, &[], Some(body))
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.call(Method::Put, path, &[], Some(body))
    }

    pub fn patch(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.call(Method::Patch, path, &[], Some(body))
    }

    pub fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.call(Method::Delete, path, &[], None)
    }

    /// Iterate the pages of a list endpoint, following its continuation cursor.
    pub fn pages<'a>(
        &'a self,
        path: &str,
        query: &[(&str, &str)],
        items_key: &str,
    ) -> Pages<'a> {
        Pages::new(self, path, query, items_key)
    }
}

/// Normalize an API path: strip a leading `/` and `api/` prefix.
///
/// Absolute URLs are rejected; the host belongs to the transport.
pub fn clean_path(path: &str) -> Result<String> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Err(Error::InvalidPath(path.to_string()));
    }
    let path = path.trim_start_matches('/');
    let path = path.strip_prefix("api/").unwrap_or(path);
    if path.is_empty() {
        return Err(Error::InvalidPath("empty path".to_string()));
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, RawResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy::new(2, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/api/2.0/pipelines").unwrap(), "2.0/pipelines");
        assert_eq!(clean_path("2.1/jobs/list").unwrap(), "2.1/jobs/list");
        assert!(clean_path("https://host/api/2.0/x").is_err());
        assert!(clean_path("/").is_err());
    }

    #[test]
    fn test_always_rate_limited_returns_last_response() {
        let mock = MockTransport::always(429, json!({"error_code": "REQUEST_LIMIT_EXCEEDED"}));
        let client = WorkspaceClient::new(Arc::new(mock.clone())).with_retry(fast());

        let response = client.get("2.0/pipelines", &[]).unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.error_code(), Some("REQUEST_LIMIT_EXCEEDED"));
        // one attempt plus exactly two retries
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_rate_limit_then_success() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mock = MockTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                RawResponse::new(429, json!({}))
            } else {
                RawResponse::ok(json!({"pipeline_id": "p-1"}))
            }
        });
        let client = WorkspaceClient::new(Arc::new(mock.clone())).with_retry(fast());

        let response = client.post("2.0/pipelines", &json!({"name": "x"})).unwrap();

        assert_eq!(response.str_field("pipeline_id"), Some("p-1"));
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn test_server_error_is_not_retried() {
        let mock = MockTransport::always(500, json!({"error_code": "INTERNAL_ERROR"}));
        let client = WorkspaceClient::new(Arc::new(mock.clone())).with_retry(fast());

        let response = client.get("2.0/sql/warehouses", &[]).unwrap();

        assert!(response.is_error());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_no_retry_policy() {
        let mock = MockTransport::always(429, json!({}));
        let client = WorkspaceClient::new(Arc::new(mock.clone())).with_retry(RetryPolicy::no_retry());
        assert_eq!(client.get("x", &[]).unwrap().status, 429);
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_delay_grows_with_attempt() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));

        let jittered = RetryPolicy::new(2, Duration::from_millis(100), Duration::from_millis(50));
        let delay = jittered.delay_for_attempt(0);
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(150));
    }

    #[test]
    fn test_query_and_body_forwarded() {
        let mock = MockTransport::always(200, json!({}));
        let client = WorkspaceClient::new(Arc::new(mock.clone()));
        client
            .call(
                Method::Patch,
                "/api/2.0/repos/7",
                &[("a", "b")],
                Some(&json!({"branch": "main"})),
            )
            .unwrap();
        let call = &mock.calls()[0];
        assert_eq!(call.method, Method::Patch);
        assert_eq!(call.path, "2.0/repos/7");
        assert_eq!(call.query_param("a"), Some("b"));
        assert_eq!(call.body_field("branch"), Some(&json!("main")));
    }
}
