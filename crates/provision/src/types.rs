//! Core types for provisioning

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

/// Kind of a provisioned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cluster,
    Warehouse,
    Pipeline,
    Workflow,
    Dashboard,
    Repo,
    QueryRoom,
    DataLoad,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Cluster,
        ResourceKind::Warehouse,
        ResourceKind::Pipeline,
        ResourceKind::Workflow,
        ResourceKind::Dashboard,
        ResourceKind::Repo,
        ResourceKind::QueryRoom,
        ResourceKind::DataLoad,
    ];

    /// Stable lowercase name, used in markers, reports and target filters
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Warehouse => "warehouse",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Workflow => "workflow",
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Repo => "repo",
            ResourceKind::QueryRoom => "query_room",
            ResourceKind::DataLoad => "data_load",
        }
    }

    /// Uppercase name used in `{{DYNAMIC_<KIND>_ID_<id>}}` template tokens
    pub fn token_name(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "CLUSTER",
            ResourceKind::Warehouse => "WAREHOUSE",
            ResourceKind::Pipeline => "PIPELINE",
            ResourceKind::Workflow => "WORKFLOW",
            ResourceKind::Dashboard => "DASHBOARD",
            ResourceKind::Repo => "REPO",
            ResourceKind::QueryRoom => "QUERY_ROOM",
            ResourceKind::DataLoad => "DATA_LOAD",
        }
    }

    /// Parse a token kind name. `DLT` is accepted for pipelines.
    pub fn from_token_name(name: &str) -> Option<Self> {
        match name {
            "DLT" => Some(ResourceKind::Pipeline),
            "JOB" => Some(ResourceKind::Workflow),
            "GENIE" => Some(ResourceKind::QueryRoom),
            _ => Self::ALL.into_iter().find(|k| k.token_name() == name),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" | "jobs" | "workflows" => Ok(ResourceKind::Workflow),
            "genie" | "genie_room" | "query_rooms" => Ok(ResourceKind::QueryRoom),
            "data_folder" | "data" => Ok(ResourceKind::DataLoad),
            "pipelines" | "dlt" => Ok(ResourceKind::Pipeline),
            "dashboards" => Ok(ResourceKind::Dashboard),
            "repos" => Ok(ResourceKind::Repo),
            _ => Self::ALL
                .into_iter()
                .find(|k| k.as_str() == s)
                .ok_or_else(|| format!("unknown resource kind: {s}")),
        }
    }
}

/// What provisioning did to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A new resource was created
    Created,
    /// An existing resource was reconciled with the definition
    Updated,
    /// An existing resource was used as is
    Reused,
    /// The resource failed and caller-supplied fallback was used instead
    Fallback,
    /// Nothing was done (filtered out, disabled, dry run)
    Skipped,
    /// Provisioning failed
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Failure details kept in a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    /// The definition that was submitted, when the failure came from the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
    /// The raw API response that reported the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl From<ProvisionError> for Failure {
    fn from(err: ProvisionError) -> Self {
        Self {
            message: err.message,
            definition: err.definition,
            response: err.response,
        }
    }
}

/// Successful value returned by a provisioner
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub uid: Option<String>,
    pub outcome: Outcome,
    pub name: Option<String>,
    pub warnings: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Provisioned {
    fn with_outcome(uid: Option<String>, outcome: Outcome) -> Self {
        Self {
            uid,
            outcome,
            name: None,
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn created(uid: impl Into<String>) -> Self {
        Self::with_outcome(Some(uid.into()), Outcome::Created)
    }

    pub fn updated(uid: impl Into<String>) -> Self {
        Self::with_outcome(Some(uid.into()), Outcome::Updated)
    }

    pub fn reused(uid: impl Into<String>) -> Self {
        Self::with_outcome(Some(uid.into()), Outcome::Reused)
    }

    pub fn fallback(uid: impl Into<String>) -> Self {
        Self::with_outcome(Some(uid.into()), Outcome::Fallback)
    }

    /// Nothing done; `reason` becomes a warning
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::with_outcome(None, Outcome::Skipped).warn(reason)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of provisioning one resource spec.
///
/// Produced exactly once per spec per installation; failures still yield one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionResult {
    pub kind: ResourceKind,
    pub logical_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub provisioned_uid: Option<String>,
    pub outcome: Outcome,
    pub error: Option<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ProvisionResult {
    pub fn from_outcome(
        kind: ResourceKind,
        logical_id: impl Into<String>,
        outcome: Result<Provisioned, ProvisionError>,
    ) -> Self {
        let logical_id = logical_id.into();
        match outcome {
            Ok(done) => Self {
                kind,
                logical_id,
                name: done.name,
                provisioned_uid: done.uid,
                outcome: done.outcome,
                error: None,
                warnings: done.warnings,
                metadata: done.metadata,
            },
            Err(err) => Self::failed(kind, logical_id, err),
        }
    }

    pub fn failed(kind: ResourceKind, logical_id: impl Into<String>, err: ProvisionError) -> Self {
        Self {
            kind,
            logical_id: logical_id.into(),
            name: None,
            provisioned_uid: None,
            outcome: Outcome::Failed,
            error: Some(err.into()),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn skipped(kind: ResourceKind, logical_id: impl Into<String>, reason: &str) -> Self {
        Self::from_outcome(kind, logical_id, Ok(Provisioned::skipped(reason)))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|f| f.message.as_str())
    }

    /// Append a warning produced after the result was recorded
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Counts of outcomes across one or more stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub created: usize,
    pub updated: usize,
    pub reused: usize,
    pub fallback: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated
    }

    /// Check if provisioning was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.reused + self.fallback + self.skipped + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &StageSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.reused += other.reused;
        self.fallback += other.fallback;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ProvisionResult) {
        match result.outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Reused => self.reused += 1,
            Outcome::Fallback => self.fallback += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

impl<'a> FromIterator<&'a ProvisionResult> for StageSummary {
    fn from_iter<I: IntoIterator<Item = &'a ProvisionResult>>(iter: I) -> Self {
        let mut summary = Self::default();
        for result in iter {
            summary.add_result(result);
        }
        summary
    }
}

/// Options for stage execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Only look resources up, never create or modify them
    pub dry_run: bool,
    /// Worker pool size within a stage
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
        }
    }
}
