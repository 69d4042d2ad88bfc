//! Installation report
//!
//! Built by the installer while it runs and returned once. Serializes to
//! JSON for `install --json`.

use notebook::Rewrite;
use provision::{ProvisionResult, ResourceKind, StageSummary};
use serde::Serialize;
use std::collections::BTreeMap;

/// What happened to one uploaded document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    /// Path inside the bundle
    pub source: String,
    /// Workspace path
    pub path: String,
    pub uploaded: bool,
    #[serde(flatten)]
    pub rewrite: Rewrite,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentReport {
    pub fn uploaded(source: impl Into<String>, path: impl Into<String>, rewrite: Rewrite) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            uploaded: true,
            rewrite,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            uploaded: false,
            rewrite: Rewrite::default(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallationReport {
    pub bundle: String,
    pub folder: String,
    pub catalog: String,
    pub schema: String,
    pub dry_run: bool,
    pub results: Vec<ProvisionResult>,
    pub documents: Vec<DocumentReport>,
    /// Installation-level warnings; per-resource ones live in the results
    pub warnings: Vec<String>,
    pub summary: StageSummary,
}

impl InstallationReport {
    pub fn new(bundle: &str, folder: &str, catalog: &str, schema: &str) -> Self {
        Self {
            bundle: bundle.to_string(),
            folder: folder.to_string(),
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            ..Self::default()
        }
    }

    pub fn extend_results(&mut self, results: impl IntoIterator<Item = ProvisionResult>) {
        for result in results {
            self.summary.add_result(&result);
            self.results.push(result);
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn result(&self, kind: ResourceKind, logical_id: &str) -> Option<&ProvisionResult> {
        self.results
            .iter()
            .find(|r| r.kind == kind && r.logical_id == logical_id)
    }

    pub fn by_kind(&self) -> BTreeMap<ResourceKind, Vec<&ProvisionResult>> {
        let mut grouped: BTreeMap<ResourceKind, Vec<&ProvisionResult>> = BTreeMap::new();
        for result in &self.results {
            grouped.entry(result.kind).or_default().push(result);
        }
        grouped
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProvisionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn failed_documents(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| !d.uploaded)
    }

    /// No resource failed and every document was uploaded
    pub fn is_success(&self) -> bool {
        self.summary.is_success() && self.failed_documents().next().is_none()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
