//! Bundle descriptor (`bundle.json`)
//!
//! The descriptor is immutable once parsed. Definitions stay opaque JSON; the
//! provisioners only touch the keys they normalize.

use provision::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

fn default_true() -> bool {
    true
}

fn default_catalog() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Catalog the bundle content was written against
    #[serde(default = "default_catalog")]
    pub default_catalog: String,
    /// Schema the bundle content was written against
    #[serde(default)]
    pub default_schema: Option<String>,
    /// Whether `--catalog` / `--schema` may relocate the bundle
    #[serde(default)]
    pub custom_schema_supported: bool,
    #[serde(default = "default_true")]
    pub create_cluster: bool,
    /// Cluster definition overrides
    #[serde(default)]
    pub cluster: Value,
    #[serde(default)]
    pub cluster_libraries: Vec<Value>,
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
    #[serde(default)]
    pub dashboards: Vec<DashboardSpec>,
    #[serde(default)]
    pub genie_rooms: Vec<QueryRoomSpec>,
    #[serde(default)]
    pub data_folders: Vec<DataFolderSpec>,
    #[serde(default)]
    pub repos: Vec<RepoSpec>,
    #[serde(default)]
    pub notebooks: Vec<NotebookSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub id: String,
    pub definition: Value,
    /// Start a full-refresh update once content is uploaded
    #[serde(default)]
    pub run_after_creation: bool,
    /// Tables the pipeline reads before it has produced them
    #[serde(default)]
    pub placeholder_tables: Vec<String>,
}

impl PipelineSpec {
    pub fn name(&self) -> Option<&str> {
        self.definition.get("name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub id: String,
    /// `{"settings": {...}}` as accepted by the jobs API
    pub definition: Value,
    #[serde(default)]
    pub start_on_install: bool,
}

impl WorkflowSpec {
    pub fn name(&self) -> Option<&str> {
        self.definition
            .pointer("/settings/name")
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSpec {
    /// Also the definition file name: `_resources/dashboards/<id>.lvdash.json`
    pub id: String,
    pub name: String,
    /// Query room whose id is injected as the dashboard's assistant room
    #[serde(default)]
    pub genie_room_id: Option<String>,
}

impl DashboardSpec {
    pub fn definition_path(&self) -> String {
        format!("_resources/dashboards/{}.lvdash.json", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlInstruction {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRoomSpec {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub table_identifiers: Vec<String>,
    #[serde(default)]
    pub curated_questions: Vec<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub sql_instructions: Vec<SqlInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFolderSpec {
    /// Absolute location, or a path relative to the bundle volume
    pub source_folder: String,
    pub source_format: String,
    pub target_table_name: String,
    #[serde(default = "default_table_format")]
    pub target_format: String,
}

fn default_table_format() -> String {
    "delta".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub id: String,
    /// Workspace path of the mirror, e.g. `/Repos/{{CURRENT_USER}}/project`
    pub path: String,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_provider() -> String {
    "gitHub".to_string()
}

/// What an uploaded content entry is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    /// A notebook; its links are rewritten before upload
    #[default]
    Notebook,
    /// A folder shipped as `<path>.zip`
    Directory,
    /// Any other file, uploaded byte for byte
    File,
}

impl ObjectKind {
    /// Bundle file holding the entry
    pub fn source_path(&self, clean_path: &str) -> String {
        match self {
            ObjectKind::Notebook => format!("{clean_path}.ipynb"),
            ObjectKind::Directory => format!("{clean_path}.zip"),
            ObjectKind::File => clean_path.to_string(),
        }
    }

    /// Workspace path the entry is imported to
    pub fn target_path(&self, folder: &str, clean_path: &str) -> String {
        match self {
            ObjectKind::Directory => format!("{folder}/{clean_path}.zip"),
            ObjectKind::Notebook | ObjectKind::File => format!("{folder}/{clean_path}"),
        }
    }

    /// `format` of the workspace import call
    pub fn import_format(&self) -> &'static str {
        match self {
            ObjectKind::Notebook => "JUPYTER",
            ObjectKind::Directory | ObjectKind::File => "AUTO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookSpec {
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub object_type: ObjectKind,
}

impl NotebookSpec {
    pub fn new(path: &str, title: &str) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            description: String::new(),
            object_type: ObjectKind::Notebook,
        }
    }

    /// Path inside the install folder.
    ///
    /// Notebooks shared between bundles are referenced relatively
    /// (`../../other-bundle/sub/_resources/x`); the `..` segments and the
    /// folders they climb out of are dropped (`sub/_resources/x`).
    pub fn clean_path(&self) -> String {
        let parts: Vec<&str> = self
            .path
            .split('/')
            .filter(|p| !p.is_empty() && *p != ".")
            .collect();
        let parents = parts.iter().filter(|p| **p == "..").count();
        let skip = if parents > 0 { parents * 2 - 1 } else { 0 };
        parts
            .into_iter()
            .skip(skip)
            .filter(|p| *p != "..")
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Schema name derived from a bundle name
pub fn schema_from_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl BundleDescriptor {
    pub fn parse(text: &str) -> Result<Self, String> {
        let descriptor: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Whether anything in the bundle needs a SQL warehouse
    pub fn needs_warehouse(&self) -> bool {
        !self.dashboards.is_empty()
            || !self.genie_rooms.is_empty()
            || !self.data_folders.is_empty()
            || self.pipelines.iter().any(|p| !p.placeholder_tables.is_empty())
            || self
                .workflows
                .iter()
                .any(|w| w.definition.to_string().contains("{{SHARED_WAREHOUSE_ID}}"))
    }

    /// Logical ids declared per kind
    pub fn logical_ids(&self) -> Vec<(ResourceKind, &str)> {
        let mut ids = Vec::new();
        ids.extend(self.pipelines.iter().map(|p| (ResourceKind::Pipeline, p.id.as_str())));
        ids.extend(self.workflows.iter().map(|w| (ResourceKind::Workflow, w.id.as_str())));
        ids.extend(self.dashboards.iter().map(|d| (ResourceKind::Dashboard, d.id.as_str())));
        ids.extend(self.genie_rooms.iter().map(|r| (ResourceKind::QueryRoom, r.id.as_str())));
        ids.extend(
            self.data_folders
                .iter()
                .map(|d| (ResourceKind::DataLoad, d.target_table_name.as_str())),
        );
        ids.extend(self.repos.iter().map(|r| (ResourceKind::Repo, r.id.as_str())));
        ids
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is empty".to_string());
        }
        if !self.cluster.is_null() && !self.cluster.is_object() {
            return Err("cluster must be an object".to_string());
        }

        let mut seen = BTreeSet::new();
        for (kind, id) in self.logical_ids() {
            if id.trim().is_empty() {
                return Err(format!("a {kind} has an empty id"));
            }
            if !seen.insert((kind, id)) {
                return Err(format!("duplicate {kind} id '{id}'"));
            }
        }

        if let Some(p) = self.pipelines.iter().find(|p| p.name().is_none()) {
            return Err(format!("pipeline '{}' has no definition.name", p.id));
        }
        if let Some(w) = self.workflows.iter().find(|w| w.name().is_none()) {
            return Err(format!("workflow '{}' has no definition.settings.name", w.id));
        }
        if let Some(n) = self.notebooks.iter().find(|n| n.clean_path().is_empty()) {
            return Err(format!("notebook path '{}' is empty", n.path));
        }
        Ok(())
    }
}
