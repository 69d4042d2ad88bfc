//! # wsclient
//!
//! Blocking client for the workspace REST API.
//!
//! - [`WorkspaceClient`] sends requests through a [`Transport`] and retries
//!   rate-limited (429) answers with a bounded, jittered backoff.
//! - [`ApiResponse`] keeps error payloads as values: a response carrying an
//!   `error_code` is not an `Err`.
//! - [`Pages`] follows `next_page_token` / `has_more` cursors transparently.
//!
//! ## Testing
//!
//! [`MockTransport`] answers from a closure and records every request:
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use wsclient::{MockTransport, WorkspaceClient};
//!
//! let mock = MockTransport::always(200, json!({"warehouses": []}));
//! let client = WorkspaceClient::new(Arc::new(mock.clone()));
//! let items = client.pages("2.0/sql/warehouses", &[], "warehouses").collect_items().unwrap();
//! assert!(items.is_empty());
//! assert_eq!(mock.call_count(), 1);
//! ```

pub mod client;
pub mod error;
pub mod pager;
pub mod response;
pub mod transport;

pub use client::{RetryPolicy, WorkspaceClient, clean_path};
pub use error::{Error, ErrorCategory, Result};
pub use pager::{Page, Pages};
pub use response::ApiResponse;
pub use transport::{ApiRequest, HttpTransport, Method, MockTransport, RawResponse, Transport};
