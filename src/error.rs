//! Fatal installation errors
//!
//! Anything in here aborts an installation before the first resource is
//! provisioned. Per-resource failures are not errors at this level: they are
//! recorded in the report and the installation continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    /// The workspace rejected the token
    #[error("invalid credential for {host}: {message}")]
    InvalidCredential { host: String, message: String },

    /// The install location (folder, catalog or schema) cannot be used
    #[error("invalid install location '{path}': {reason}")]
    InvalidTargetPath { path: String, reason: String },

    /// No bundle with this name in the bundle source
    #[error("unknown bundle '{name}'{}", available_hint(.available))]
    UnknownBundle { name: String, available: Vec<String> },

    /// The bundle descriptor does not parse or validate
    #[error("invalid descriptor for bundle '{bundle}': {message}")]
    InvalidDescriptor { bundle: String, message: String },

    /// The install folder exists and overwrite was not requested
    #[error("install folder {path} already exists (use --overwrite to replace it)")]
    FolderExists { path: String },

    /// Deleting the existing install folder was declined
    #[error("installation aborted: {path} was left untouched")]
    Aborted { path: String },

    /// The stage worker pool could not be started
    #[error("could not start workers: {0}")]
    WorkerPool(String),

    /// The workspace could not be reached
    #[error(transparent)]
    Client(#[from] wsclient::Error),
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", available.join(", "))
    }
}

impl InstallError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTargetPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_descriptor(bundle: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidDescriptor {
            bundle: bundle.into(),
            message: message.to_string(),
        }
    }
}
