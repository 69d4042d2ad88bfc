//! Textual rewrite of markers.
//!
//! Only two edits are ever made: a placeholder replaced by a provisioned id,
//! or a whole anchor replaced by an inline error annotation. Every byte
//! outside those ranges is copied unchanged.

use crate::marker::{Marker, scan};
use provision::{ProvisionResult, ResourceKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// What a marker resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The resource exists under this id.
    Resolved(String),
    /// The resource was attempted and failed with this message.
    Failed(String),
    /// Resources of this kind were provisioned, but not this logical id.
    UnknownId,
    /// No resource of this kind was provisioned at all.
    KindNotProvisioned,
}

/// Maps `(kind, logical_id)` to a [`Resolution`].
pub trait LinkResolver {
    fn resolve(&self, kind: ResourceKind, logical_id: &str) -> Resolution;
}

/// Resolver built from provisioning results.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    entries: HashMap<(ResourceKind, String), Result<String, String>>,
    kinds: BTreeSet<ResourceKind>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a ProvisionResult>,
    {
        let mut table = Self::new();
        for result in results {
            table.record(result);
        }
        table
    }

    /// Record one result. Results without a uid (failed or skipped) resolve
    /// to an annotation.
    pub fn record(&mut self, result: &ProvisionResult) {
        let entry = match (&result.provisioned_uid, result.error_message()) {
            (_, Some(message)) => Err(message.to_string()),
            (Some(uid), None) => Ok(uid.clone()),
            (None, None) => Err(result
                .warnings
                .first()
                .cloned()
                .unwrap_or_else(|| "not installed".to_string())),
        };
        self.insert(result.kind, &result.logical_id, entry);
    }

    pub fn insert(&mut self, kind: ResourceKind, logical_id: &str, entry: Result<String, String>) {
        self.kinds.insert(kind);
        self.entries.insert((kind, logical_id.to_string()), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LinkResolver for LinkTable {
    fn resolve(&self, kind: ResourceKind, logical_id: &str) -> Resolution {
        match self.entries.get(&(kind, logical_id.to_string())) {
            Some(Ok(uid)) => Resolution::Resolved(uid.clone()),
            Some(Err(message)) => Resolution::Failed(message.clone()),
            None if self.kinds.contains(&kind) => Resolution::UnknownId,
            None => Resolution::KindNotProvisioned,
        }
    }
}

/// A rewritten document and what happened to its markers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Rewrite {
    #[serde(skip)]
    pub content: String,
    /// Placeholders replaced by provisioned ids.
    pub resolved: usize,
    /// Anchors replaced by error annotations.
    pub annotated: usize,
    /// `kind:id` of markers left untouched.
    pub unresolved: Vec<String>,
    pub warnings: Vec<String>,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        self.resolved + self.annotated > 0
    }
}

/// Rewrite every marker of `text`.
pub fn rewrite(text: &str, resolver: &dyn LinkResolver) -> Rewrite {
    let mut out = Rewrite {
        content: String::with_capacity(text.len()),
        ..Rewrite::default()
    };
    let mut cursor = 0;

    for marker in scan(text) {
        let Some(kind) = marker.kind else {
            out.warnings.push(format!(
                "unknown marker kind '{}' for '{}'",
                marker.kind_name, marker.logical_id
            ));
            out.unresolved
                .push(format!("{}:{}", marker.kind_name, marker.logical_id));
            continue;
        };

        match resolver.resolve(kind, &marker.logical_id) {
            Resolution::Resolved(uid) => {
                out.content.push_str(&text[cursor..marker.placeholder.start]);
                out.content.push_str(link_target(text, &marker, &uid));
                cursor = marker.placeholder.end;
                out.resolved += 1;
            }
            Resolution::Failed(message) => {
                out.content.push_str(&text[cursor..marker.span.start]);
                out.content.push_str(&annotation(&marker, kind, &message));
                cursor = marker.span.end;
                out.annotated += 1;
            }
            Resolution::UnknownId => {
                out.warnings.push(format!(
                    "no {kind} named '{}' was provisioned; link left unchanged",
                    marker.logical_id
                ));
                out.unresolved.push(format!("{kind}:{}", marker.logical_id));
            }
            Resolution::KindNotProvisioned => {
                out.warnings.push(format!(
                    "no {kind} was provisioned; link to '{}' left unchanged",
                    marker.logical_id
                ));
                out.unresolved.push(format!("{kind}:{}", marker.logical_id));
            }
        }
    }

    out.content.push_str(&text[cursor..]);
    out
}

/// The id as inserted into the href. Path-like ids (repositories) drop their
/// leading `/` when the href already has one before the placeholder.
fn link_target<'a>(text: &str, marker: &Marker, uid: &'a str) -> &'a str {
    if text[..marker.placeholder.start].ends_with('/') {
        uid.trim_start_matches('/')
    } else {
        uid
    }
}

fn annotation(marker: &Marker, kind: ResourceKind, message: &str) -> String {
    let label = if marker.text.trim().is_empty() {
        marker.logical_id.as_str()
    } else {
        marker.text.trim()
    };
    let note = format!(
        "{label}: ERROR - could not install {kind} '{}'. {message}",
        marker.logical_id
    );
    if marker.escaped {
        json_escape(&note)
    } else {
        note
    }
}

/// Escape for embedding inside an existing JSON string literal.
fn json_escape(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision::{ProvisionError, Provisioned};

    fn table() -> LinkTable {
        LinkTable::from_results(&[
            ProvisionResult::from_outcome(ResourceKind::Pipeline, "ingest", Ok(Provisioned::created("p-123"))),
            ProvisionResult::from_outcome(ResourceKind::Workflow, "daily", Ok(Provisioned::reused("987"))),
            ProvisionResult::failed(
                ResourceKind::Dashboard,
                "sales",
                ProvisionError::new("warehouse \"shared\" is stopped"),
            ),
        ])
    }

    const DOC: &str = concat!(
        "# Overview\n",
        "Open <a bundle-pipeline-id=\"ingest\" href=\"#joblist/pipelines/PIPE/updates\">the pipeline</a>,\n",
        "then <a bundle-workflow-id=\"daily\" href=\"#job/JOB\">the job</a>\n",
        "and <a bundle-dashboard-id=\"sales\" href=\"/sql/dashboardsv3/DASH\">Sales</a>.\n",
        "Trailing text.\n",
    );

    #[test]
    fn test_rewrite_resolves_and_annotates() {
        let rewrite = rewrite(DOC, &table());

        assert_eq!(rewrite.resolved, 2);
        assert_eq!(rewrite.annotated, 1);
        assert!(rewrite.unresolved.is_empty());

        let expected = concat!(
            "# Overview\n",
            "Open <a bundle-pipeline-id=\"ingest\" href=\"#joblist/pipelines/p-123/updates\">the pipeline</a>,\n",
            "then <a bundle-workflow-id=\"daily\" href=\"#job/987\">the job</a>\n",
            "and Sales: ERROR - could not install dashboard 'sales'. warehouse \"shared\" is stopped.\n",
            "Trailing text.\n",
        );
        assert_eq!(rewrite.content, expected);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = rewrite(DOC, &table());
        let twice = rewrite(&once.content, &table());
        assert_eq!(once.content, twice.content);
        assert_eq!(twice.annotated, 0);
    }

    #[test]
    fn test_unprovisioned_kind_left_untouched() {
        let doc = "x <a bundle-query_room-id=\"chat\" href=\"/genie/rooms/R\">ask</a> y";
        let rewrite = rewrite(doc, &table());
        assert_eq!(rewrite.content, doc);
        assert_eq!(rewrite.unresolved, vec!["query_room:chat".to_string()]);
        assert_eq!(rewrite.warnings.len(), 1);
        assert!(!rewrite.changed());
    }

    #[test]
    fn test_unknown_id_of_provisioned_kind_left_untouched() {
        let doc = "<a bundle-pipeline-id=\"other\" href=\"#joblist/pipelines/P\">p</a>";
        let rewrite = rewrite(doc, &table());
        assert_eq!(rewrite.content, doc);
        assert_eq!(rewrite.unresolved, vec!["pipeline:other".to_string()]);
    }

    #[test]
    fn test_annotation_inside_json_string_stays_valid() {
        let doc = r#"{"source": ["<a bundle-dashboard-id=\"sales\" href=\"/sql/dashboardsv3/D\">Sales</a>"]}"#;
        let rewrite = rewrite(doc, &table());
        let parsed: serde_json::Value = serde_json::from_str(&rewrite.content).unwrap();
        assert_eq!(
            parsed["source"][0],
            "Sales: ERROR - could not install dashboard 'sales'. warehouse \"shared\" is stopped"
        );
    }

    #[test]
    fn test_repo_path_joins_cleanly() {
        let mut table = LinkTable::new();
        table.insert(ResourceKind::Repo, "code", Ok("/Repos/jane/code".to_string()));
        let doc = "<a bundle-repo-id=\"code\" href=\"#workspace/REPO/README.md\">repo</a>";
        let rewrite = rewrite(doc, &table);
        assert!(rewrite.content.contains("href=\"#workspace/Repos/jane/code/README.md\""));
    }

    #[test]
    fn test_skipped_result_annotates_with_reason() {
        let table = LinkTable::from_results(&[ProvisionResult::skipped(
            ResourceKind::Dashboard,
            "sales",
            "dashboards disabled",
        )]);
        let rewrite = rewrite("<a bundle-dashboard-id=\"sales\" href=\"D\">S</a>", &table);
        assert_eq!(rewrite.content, "S: ERROR - could not install dashboard 'sales'. dashboards disabled");
    }
}
