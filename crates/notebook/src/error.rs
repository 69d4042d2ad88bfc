//! Errors of the content rewriter.

/// Result type alias for rewrite operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Only text documents can carry markers.
    #[error("document {path} is not valid UTF-8")]
    NotText {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}
