//! # notebook
//!
//! Rewrites resource link markers inside content documents once the
//! resources they point at have been provisioned.
//!
//! ```
//! use notebook::{LinkTable, rewrite};
//! use provision::ResourceKind;
//!
//! let mut links = LinkTable::new();
//! links.insert(ResourceKind::Pipeline, "ingest", Ok("p-1".to_string()));
//!
//! let doc = r#"<a bundle-pipeline-id="ingest" href="/pipelines/ID">run</a>"#;
//! let out = rewrite(doc, &links);
//! assert_eq!(out.content, r#"<a bundle-pipeline-id="ingest" href="/pipelines/p-1">run</a>"#);
//! ```

pub mod error;
pub mod marker;
pub mod rewrite;

pub use error::{Error, Result};
pub use marker::{MARKER_ATTR_PREFIX, Marker, routes, scan};
pub use rewrite::{LinkResolver, LinkTable, Resolution, Rewrite, rewrite};

/// Rewrite a raw document, which must be UTF-8 text.
pub fn rewrite_bytes(path: &str, bytes: Vec<u8>, resolver: &dyn LinkResolver) -> Result<Rewrite> {
    let text = String::from_utf8(bytes).map_err(|source| Error::NotText {
        path: path.to_string(),
        source,
    })?;
    Ok(rewrite(&text, resolver))
}
