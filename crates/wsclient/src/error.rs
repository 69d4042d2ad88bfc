//! Error types for workspace API calls.
//!
//! Only transport-level problems are errors. A response that carries an
//! `error_code` is a normal [`ApiResponse`](crate::ApiResponse) value; callers
//! turn it into [`Error::Api`] explicitly when they need a success payload.

use serde_json::Value;
use std::fmt;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, DNS or TLS failure.
    Network,
    /// The request did not finish within the configured timeout.
    Timeout,
    /// The caller built an invalid request.
    Request,
    /// The workspace answered with an error payload.
    Api,
    /// The response body could not be understood.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Timeout => "Request timed out",
            Self::Request => "Invalid request",
            Self::Api => "Workspace API error",
            Self::Format => "Invalid response format",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the workspace host and your connection, then try again",
            Self::Timeout => "The workspace is slow to answer; raise request_timeout_secs or retry",
            Self::Request => "This is likely a bug in the bundle descriptor or installer",
            Self::Api => "Check the error code and the permissions of the installing user",
            Self::Format => "The workspace returned an unexpected payload",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection-level failure.
    #[error("request to {path} failed: {message}")]
    Transport {
        /// API path of the request.
        path: String,
        /// Error message.
        message: String,
    },

    /// The request exceeded its timeout.
    #[error("request to {path} timed out")]
    Timeout {
        /// API path of the request.
        path: String,
    },

    /// The API path cannot be sent to the workspace.
    #[error("invalid API path: {0}")]
    InvalidPath(String),

    /// The workspace answered with an error payload.
    #[error("{path} returned {status}: {message}")]
    Api {
        /// API path of the request.
        path: String,
        /// HTTP status code.
        status: u16,
        /// `error_code` field, when present.
        code: Option<String>,
        /// Human readable message.
        message: String,
        /// Raw response body.
        body: Value,
    },

    /// The response body is not what the caller expected.
    #[error("unexpected response from {path}: {message}")]
    Decode {
        /// API path of the request.
        path: String,
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::InvalidPath(_) => ErrorCategory::Request,
            Error::Api { .. } => ErrorCategory::Api,
            Error::Decode { .. } => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// The `error_code` of an API error, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The raw response body of an API error, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Error::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    pub(crate) fn transport(path: impl Into<String>, err: ureq::Error) -> Self {
        let path = path.into();
        match err {
            ureq::Error::Timeout(_) => Self::Timeout { path },
            other => Self::Transport {
                path,
                message: other.to_string(),
            },
        }
    }
}
