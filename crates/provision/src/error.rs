//! Provisioning errors.

use serde_json::Value;

/// Failure of one provisioner, caught at the resource boundary.
///
/// Carries the submitted definition and the raw response so the report can
/// show what the workspace rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionError {
    pub message: String,
    pub definition: Option<Value>,
    pub response: Option<Value>,
}

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            definition: None,
            response: None,
        }
    }

    pub fn with_definition(mut self, definition: Value) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Prefix the message with context, keeping definition and response.
    pub fn context(mut self, context: impl AsRef<str>) -> Self {
        self.message = format!("{}: {}", context.as_ref(), self.message);
        self
    }
}

impl From<wsclient::Error> for ProvisionError {
    fn from(err: wsclient::Error) -> Self {
        let response = err.body().cloned();
        Self {
            message: err.to_string(),
            definition: None,
            response,
        }
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid definition: {err}"))
    }
}
