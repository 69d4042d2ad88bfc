//! Marker grammar.
//!
//! A marker is an anchor carrying the kind and logical id of a resource:
//!
//! ```text
//! <a bundle-pipeline-id="ingest" href="#joblist/pipelines/PLACEHOLDER/updates">Ingest</a>
//! ```
//!
//! The placeholder is the path segment following the kind's route
//! (`pipelines/`, `jobs/`, ...) or, when no route is present, the leading
//! segment of the href. Quotes may be backslash-escaped when the anchor sits
//! inside a JSON string (`.ipynb` sources).

use provision::ResourceKind;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Prefix of the marker attribute, followed by `<kind>-id`.
pub const MARKER_ATTR_PREFIX: &str = "bundle-";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a\s+bundle-(?P<kind>[a-z_]+)-id=(?P<esc>\\?)"(?P<id>[^"\\]+)\\?"\s+href=\\?"(?P<href>[^"\\]*)\\?"[^>]*>(?P<text>[^<]*)</a>"#,
    )
    .unwrap_or_else(|e| panic!("marker grammar does not compile: {e}"))
});

/// Route segments that precede the placeholder in links of a kind.
pub fn routes(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Cluster => &["clusters"],
        ResourceKind::Warehouse => &["warehouses"],
        ResourceKind::Pipeline => &["pipelines"],
        ResourceKind::Workflow => &["jobs", "job"],
        ResourceKind::Dashboard => &["dashboardsv3", "dashboards"],
        ResourceKind::Repo => &["workspace"],
        ResourceKind::QueryRoom => &["rooms"],
        ResourceKind::DataLoad => &["tables"],
    }
}

/// A marker found in a document. All ranges are byte offsets into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Kind as written in the attribute.
    pub kind_name: String,
    /// Parsed kind, `None` when the attribute names no known kind.
    pub kind: Option<ResourceKind>,
    pub logical_id: String,
    /// The whole anchor.
    pub span: Range<usize>,
    /// The placeholder inside the href.
    pub placeholder: Range<usize>,
    /// Link text.
    pub text: String,
    /// Quotes were backslash-escaped (anchor inside a JSON string).
    pub escaped: bool,
}

/// All markers of a document, in order.
pub fn scan(text: &str) -> Vec<Marker> {
    MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind_name = caps.name("kind")?.as_str().to_string();
            let kind = kind_name.parse::<ResourceKind>().ok();
            let href = caps.name("href")?;
            let local = placeholder_in(href.as_str(), kind);
            Some(Marker {
                kind,
                kind_name,
                logical_id: caps.name("id")?.as_str().to_string(),
                span: whole.range(),
                placeholder: href.start() + local.start..href.start() + local.end,
                text: caps.name("text")?.as_str().to_string(),
                escaped: caps.name("esc").is_some_and(|m| !m.as_str().is_empty()),
            })
        })
        .collect()
}

/// Locate the placeholder inside an href.
fn placeholder_in(href: &str, kind: Option<ResourceKind>) -> Range<usize> {
    let start = kind
        .and_then(|k| routes(k).iter().find_map(|route| after_route(href, route)))
        .unwrap_or_else(|| href.len() - href.trim_start_matches(['#', '/']).len());
    let len = href[start..]
        .find(['/', '?', '#'])
        .unwrap_or(href.len() - start);
    start..start + len
}

/// Offset just past the last `<route>/` segment that starts a path component.
fn after_route(href: &str, route: &str) -> Option<usize> {
    let segment = format!("{route}/");
    href.match_indices(segment.as_str())
        .filter(|(at, _)| *at == 0 || href[..*at].ends_with(['/', '#']))
        .last()
        .map(|(at, _)| at + segment.len())
}
