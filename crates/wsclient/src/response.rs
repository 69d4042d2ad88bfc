//! Workspace API responses.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Status code the workspace uses for rate limiting.
pub const STATUS_RATE_LIMITED: u16 = 429;

/// A decoded workspace response.
///
/// Error payloads are values: a response is an error when its status is not
/// 2xx or its body carries an `error_code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// API path the response belongs to.
    pub path: String,
    /// HTTP status code.
    pub status: u16,
    /// JSON body (`{}` when the body was empty).
    pub body: Value,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(path: impl Into<String>, status: u16, body: Value) -> Self {
        Self {
            path: path.into(),
            status,
            body,
        }
    }

    /// The `error_code` field of the body.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error_code").and_then(Value::as_str)
    }

    /// Whether this response describes a failure.
    pub fn is_error(&self) -> bool {
        self.error_code().is_some() || !(200..300).contains(&self.status)
    }

    /// Whether the workspace throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        self.status == STATUS_RATE_LIMITED
    }

    /// Whether the failure is a duplicate-name conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self.error_code(), Some("RESOURCE_ALREADY_EXISTS"))
            || self.status == 409
            || (self.is_error() && self.message().to_lowercase().contains("already exists"))
    }

    /// Whether the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.error_code(),
            Some("RESOURCE_DOES_NOT_EXIST" | "NOT_FOUND" | "TABLE_OR_VIEW_NOT_FOUND")
        ) || self.status == 404
    }

    /// Human readable error message, or an empty string.
    pub fn message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.error_code().map(str::to_string))
            .unwrap_or_default()
    }

    /// A string field of the body.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// A field of the body rendered as a string id (ids can be strings or numbers).
    pub fn id_field(&self, key: &str) -> Option<String> {
        match self.body.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Convert an error response into [`Error::Api`].
    pub fn into_result(self) -> Result<Value> {
        if self.is_error() {
            let code = self.error_code().map(str::to_string);
            let message = self.message();
            return Err(Error::Api {
                path: self.path,
                status: self.status,
                code,
                message,
                body: self.body,
            });
        }
        Ok(self.body)
    }

    /// Deserialize a success body into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let path = self.path.clone();
        let body = self.into_result()?;
        serde_json::from_value(body).map_err(|e| Error::Decode {
            path,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_makes_error() {
        let resp = ApiResponse::new("x", 200, json!({"error_code": "INVALID_STATE"}));
        assert!(resp.is_error());
        assert_eq!(resp.message(), "INVALID_STATE");
    }

    #[test]
    fn test_status_makes_error() {
        let resp = ApiResponse::new("x", 500, json!({}));
        assert!(resp.is_error());
        assert!(!ApiResponse::new("x", 200, json!({"id": "1"})).is_error());
    }

    #[test]
    fn test_conflict_detection() {
        let by_code = ApiResponse::new("x", 400, json!({"error_code": "RESOURCE_ALREADY_EXISTS"}));
        let by_message = ApiResponse::new(
            "x",
            400,
            json!({"error_code": "INVALID_PARAMETER_VALUE", "message": "Warehouse already exists"}),
        );
        assert!(by_code.is_conflict());
        assert!(by_message.is_conflict());
        assert!(!ApiResponse::new("x", 200, json!({"message": "already exists"})).is_conflict());
    }

    #[test]
    fn test_id_field_accepts_numbers() {
        let resp = ApiResponse::new("x", 200, json!({"job_id": 42, "id": "abc", "empty": ""}));
        assert_eq!(resp.id_field("job_id").as_deref(), Some("42"));
        assert_eq!(resp.id_field("id").as_deref(), Some("abc"));
        assert!(resp.id_field("empty").is_none());
        assert!(resp.id_field("missing").is_none());
    }

    #[test]
    fn test_into_result_keeps_body() {
        let body = json!({"error_code": "PERMISSION_DENIED", "message": "no"});
        let err = ApiResponse::new("2.1/clusters/create", 403, body.clone())
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), Some("PERMISSION_DENIED"));
        assert_eq!(err.body(), Some(&body));
    }
}
