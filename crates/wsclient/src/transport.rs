//! Transports that carry requests to the workspace.
//!
//! [`HttpTransport`] talks to a real workspace with ureq. [`MockTransport`]
//! answers from a closure and records every request, for tests.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const USER_AGENT: &str = concat!("lakebundle/", env!("CARGO_PKG_VERSION"));

/// HTTP method of a workspace call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the workspace API root (`<host>/api/`).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Cleaned path such as `2.0/pipelines`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Field of the JSON body.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key))
    }
}

/// Status and JSON body as received.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }
}

/// Sends one request and returns whatever the workspace answered.
///
/// Implementations must not treat non-2xx statuses as errors; only
/// connection-level failures are `Err`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse>;
}

/// ureq-backed transport authenticating with a bearer token.
pub struct HttpTransport {
    agent: ureq::Agent,
    host: String,
    token: String,
}

impl HttpTransport {
    /// Create a transport for `host` with a per-request timeout.
    pub fn new(host: &str, token: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            host: normalize_host(host),
            token: token.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.host, path)
    }

    fn prepare<B>(
        &self,
        builder: ureq::RequestBuilder<B>,
        query: &[(String, String)],
    ) -> ureq::RequestBuilder<B> {
        let auth = format!("Bearer {}", self.token);
        let mut builder = builder
            .header("Authorization", auth.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        for (key, value) in query {
            builder = builder.query(key.as_str(), value.as_str());
        }
        builder
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = self.url(&request.path);
        let empty = Value::Object(serde_json::Map::new());
        let body = request.body.as_ref().unwrap_or(&empty);

        let sent = match request.method {
            Method::Get => self.prepare(self.agent.get(&url), &request.query).call(),
            Method::Delete => self.prepare(self.agent.delete(&url), &request.query).call(),
            Method::Post => self
                .prepare(self.agent.post(&url), &request.query)
                .send_json(body),
            Method::Put => self
                .prepare(self.agent.put(&url), &request.query)
                .send_json(body),
            Method::Patch => self
                .prepare(self.agent.patch(&url), &request.query)
                .send_json(body),
        };

        let mut response = sent.map_err(|e| Error::transport(&request.path, e))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::transport(&request.path, e))?;

        Ok(RawResponse::new(status, decode_body(&text)))
    }
}

/// Parse a response body; non-JSON text becomes `{"message": text}`.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "message": text.trim() }))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

type Handler = dyn Fn(&ApiRequest) -> RawResponse + Send + Sync;

/// In-memory transport for tests.
///
/// Every request is recorded before the handler answers it.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<ApiRequest>>>,
}

impl MockTransport {
    /// Answer every request with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> RawResponse + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every request with the same response.
    pub fn always(status: u16, body: Value) -> Self {
        Self::new(move |_| RawResponse::new(status, body.clone()))
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok((self.handler)(request))
    }
}
