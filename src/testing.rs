//! In-memory workspace for tests
//!
//! [`FakeWorkspace`] answers the workspace API with a small stateful model:
//! created resources are listed afterwards, so provisioners can be run twice
//! to check idempotence. Failures are injected per method and path prefix.

use anyhow::{Context as _, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use provision::PollConfig;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use wsclient::{ApiRequest, Method, MockTransport, RawResponse, RetryPolicy, WorkspaceClient};

use crate::bundle::BundleSource;
use crate::config::{Cloud, PollSettings};
use crate::context::{InstallContext, InstallSettings};

pub const USER: &str = "jane@example.com";

/// Settings of a test installation: bundle `lakehouse-retail` into
/// `main.retail`, polls without waiting
pub fn settings() -> InstallSettings {
    let poll = PollConfig::new(Duration::ZERO, 3);
    InstallSettings {
        bundle: "lakehouse-retail".to_string(),
        install_path: format!("/Users/{USER}/lakebundle"),
        bundle_folder: format!("/Users/{USER}/lakebundle/lakehouse-retail"),
        catalog: "main".to_string(),
        schema: "retail".to_string(),
        username: USER.to_string(),
        cloud: Cloud::Aws,
        serverless: false,
        warehouse_name: None,
        fallback_cluster_id: None,
        use_current_cluster: false,
        update_cluster_if_exists: true,
        start_cluster: false,
        instance_pool_id: None,
        pipeline_policy_id: None,
        poll: PollSettings {
            job_runs: poll.clone(),
            cluster_stop: poll.clone(),
            statement: poll,
        },
        today: "2026-10-19".to_string(),
    }
}

#[derive(Debug, Clone)]
struct Injected {
    method: String,
    prefix: String,
    status: u16,
    body: Value,
    once: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    user: String,
    folders: BTreeMap<String, u64>,
    imports: BTreeMap<String, (String, Vec<u8>)>,
    clusters: Vec<Value>,
    warehouses: Vec<Value>,
    pipelines: Vec<Value>,
    jobs: Vec<Value>,
    dashboards: Vec<Value>,
    rooms: Vec<Value>,
    room_questions: BTreeMap<String, Vec<Value>>,
    room_instructions: BTreeMap<String, Vec<Value>>,
    repos: Vec<Value>,
    tables: BTreeSet<String>,
    schemas: BTreeSet<String>,
    volumes: BTreeSet<String>,
    statements: Vec<String>,
    stuck_runs: bool,
    injected: Vec<Injected>,
}

fn ok(body: Value) -> RawResponse {
    RawResponse::ok(body)
}

fn error(status: u16, code: &str, message: &str) -> RawResponse {
    RawResponse::new(status, json!({ "error_code": code, "message": message }))
}

fn not_found(what: &str) -> RawResponse {
    error(404, "RESOURCE_DOES_NOT_EXIST", &format!("{what} does not exist"))
}

fn str_of<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn id_eq(item: &Value, key: &str, id: &str) -> bool {
    match item.get(key) {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn numeric_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn injected(&mut self, request: &ApiRequest) -> Option<RawResponse> {
        let index = self.injected.iter().position(|i| {
            i.method == request.method.as_str() && request.path.starts_with(&i.prefix)
        })?;
        let injected = if self.injected[index].once {
            self.injected.remove(index)
        } else {
            self.injected[index].clone()
        };
        Some(RawResponse::new(injected.status, injected.body))
    }

    fn mkdirs(&mut self, path: &str) {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            if !self.folders.contains_key(&current) {
                let id = self.numeric_id();
                self.folders.insert(current.clone(), id);
            }
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some(("", _)) | None => true,
            Some((parent, _)) => self.folders.contains_key(parent),
        }
    }

    fn route(&mut self, request: &ApiRequest) -> RawResponse {
        if let Some(response) = self.injected(request) {
            return response;
        }
        let body = request.body.clone().unwrap_or(Value::Null);
        let segments: Vec<&str> = request.path.split('/').collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["2.0", "preview", "scim", "v2", "Me"]) => {
                ok(json!({ "userName": self.user, "active": true }))
            }

            // Workspace files
            (Method::Get, ["2.0", "workspace", "get-status"]) => {
                let path = request.query_param("path").unwrap_or_default();
                if let Some(id) = self.folders.get(path) {
                    ok(json!({ "object_type": "DIRECTORY", "object_id": id, "path": path }))
                } else if self.imports.contains_key(path) {
                    ok(json!({ "object_type": "NOTEBOOK", "object_id": 1, "path": path }))
                } else {
                    not_found(path)
                }
            }
            (Method::Post, ["2.0", "workspace", "mkdirs"]) => {
                self.mkdirs(str_of(&body, "path"));
                ok(json!({}))
            }
            (Method::Post, ["2.0", "workspace", "delete"]) => {
                let path = str_of(&body, "path").to_string();
                let nested = format!("{path}/");
                self.folders
                    .retain(|p, _| p != &path && !p.starts_with(&nested));
                self.imports
                    .retain(|p, _| p != &path && !p.starts_with(&nested));
                ok(json!({}))
            }
            (Method::Post, ["2.0", "workspace", "import"]) => {
                let path = str_of(&body, "path").to_string();
                if !self.parent_exists(&path) {
                    return not_found("parent folder");
                }
                let overwrite = body.get("overwrite").and_then(Value::as_bool) == Some(true);
                if self.imports.contains_key(&path) && !overwrite {
                    return error(400, "RESOURCE_ALREADY_EXISTS", &format!("{path} already exists"));
                }
                let Ok(content) = STANDARD.decode(str_of(&body, "content")) else {
                    return error(400, "INVALID_PARAMETER_VALUE", "content is not base64");
                };
                self.imports
                    .insert(path, (str_of(&body, "format").to_string(), content));
                ok(json!({}))
            }

            // Clusters
            (Method::Get, ["2.0", "clusters", "list"]) => ok(json!({ "clusters": self.clusters })),
            (Method::Post, ["2.0", "clusters", "create"]) => {
                let id = self.id("cluster");
                let mut cluster = body;
                cluster["cluster_id"] = json!(id);
                cluster["state"] = json!("PENDING");
                self.clusters.push(cluster);
                ok(json!({ "cluster_id": id }))
            }
            (Method::Get, ["2.0", "clusters", "get"]) => {
                let id = request.query_param("cluster_id").unwrap_or_default();
                match self.clusters.iter().find(|c| id_eq(c, "cluster_id", id)) {
                    Some(cluster) => ok(cluster.clone()),
                    None => error(400, "INVALID_PARAMETER_VALUE", "unknown cluster"),
                }
            }
            (Method::Post, ["2.0", "clusters", action @ ("edit" | "delete" | "start")]) => {
                let id = str_of(&body, "cluster_id").to_string();
                let Some(cluster) = self.clusters.iter_mut().find(|c| id_eq(c, "cluster_id", &id))
                else {
                    return error(400, "INVALID_PARAMETER_VALUE", "unknown cluster");
                };
                match *action {
                    "edit" => {
                        let state = cluster["state"].clone();
                        *cluster = body;
                        cluster["state"] = state;
                    }
                    "delete" => cluster["state"] = json!("TERMINATED"),
                    _ => cluster["state"] = json!("PENDING"),
                }
                ok(json!({}))
            }
            (Method::Post, ["2.0", "libraries", "install"]) => ok(json!({})),

            // Warehouses and SQL
            (Method::Get, ["2.0", "sql", "warehouses"]) => {
                ok(json!({ "warehouses": self.warehouses }))
            }
            (Method::Post, ["2.0", "sql", "warehouses"]) => {
                let name = str_of(&body, "name").to_string();
                if self.warehouses.iter().any(|w| str_of(w, "name") == name) {
                    return error(400, "RESOURCE_ALREADY_EXISTS", &format!("{name} already exists"));
                }
                let id = self.id("wh");
                let mut warehouse = body;
                warehouse["id"] = json!(id);
                warehouse["state"] = json!("STARTING");
                self.warehouses.push(warehouse);
                ok(json!({ "id": id }))
            }
            (Method::Post, ["2.0", "sql", "statements"]) => {
                let statement = str_of(&body, "statement").to_string();
                if let Some(table) = created_table(&statement) {
                    self.tables.insert(table);
                }
                self.statements.push(statement);
                let id = self.id("stmt");
                ok(json!({ "statement_id": id, "status": { "state": "SUCCEEDED" } }))
            }
            (Method::Get, ["2.0", "sql", "statements", id]) => {
                ok(json!({ "statement_id": id, "status": { "state": "SUCCEEDED" } }))
            }

            // Pipelines
            (Method::Get, ["2.0", "pipelines"]) => {
                let statuses: Vec<Value> = self
                    .pipelines
                    .iter()
                    .map(|p| json!({ "pipeline_id": p["pipeline_id"], "name": p["name"], "state": "IDLE" }))
                    .collect();
                ok(json!({ "statuses": statuses }))
            }
            (Method::Post, ["2.0", "pipelines"]) => {
                let name = str_of(&body, "name").to_string();
                if self.pipelines.iter().any(|p| str_of(p, "name") == name) {
                    return error(400, "RESOURCE_CONFLICT", &format!("pipeline {name} already exists"));
                }
                let id = self.id("pipeline");
                let mut pipeline = body;
                pipeline["pipeline_id"] = json!(id);
                self.pipelines.push(pipeline);
                ok(json!({ "pipeline_id": id }))
            }
            (Method::Put, ["2.0", "pipelines", id]) => {
                let Some(pipeline) = self.pipelines.iter_mut().find(|p| id_eq(p, "pipeline_id", id))
                else {
                    return not_found("pipeline");
                };
                *pipeline = body;
                pipeline["pipeline_id"] = json!(id);
                ok(json!({}))
            }
            (Method::Post, ["2.0", "pipelines", _, "updates"]) => {
                let id = self.id("update");
                ok(json!({ "update_id": id }))
            }
            (Method::Patch, ["2.0", "preview", "permissions", ..]) => ok(json!({})),

            // Jobs
            (Method::Get, ["2.1", "jobs", "list"]) => {
                let name = request.query_param("name");
                let jobs: Vec<&Value> = self
                    .jobs
                    .iter()
                    .filter(|j| name.is_none_or(|n| j.pointer("/settings/name").and_then(Value::as_str) == Some(n)))
                    .collect();
                ok(json!({ "jobs": jobs, "has_more": false }))
            }
            (Method::Post, ["2.1", "jobs", "create"]) => {
                let id = self.numeric_id();
                self.jobs.push(json!({ "job_id": id, "settings": body }));
                ok(json!({ "job_id": id }))
            }
            (Method::Post, ["2.1", "jobs", "reset"]) => {
                let id = body.get("job_id").map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                let id = id.unwrap_or_default();
                let Some(job) = self.jobs.iter_mut().find(|j| id_eq(j, "job_id", &id)) else {
                    return not_found("job");
                };
                job["settings"] = body["new_settings"].clone();
                ok(json!({}))
            }
            (Method::Post, ["2.1", "jobs", "runs", "cancel-all"]) => ok(json!({})),
            (Method::Get, ["2.1", "jobs", "runs", "list"]) => {
                if self.stuck_runs {
                    ok(json!({ "runs": [{ "run_id": 1, "state": { "life_cycle_state": "RUNNING" } }] }))
                } else {
                    ok(json!({ "has_more": false }))
                }
            }
            (Method::Post, ["2.1", "jobs", "run-now"]) => {
                let id = self.numeric_id();
                ok(json!({ "run_id": id }))
            }

            // Dashboards
            (Method::Get, ["2.0", "lakeview", "dashboards"]) => {
                ok(json!({ "dashboards": self.dashboards }))
            }
            (Method::Post, ["2.0", "lakeview", "dashboards"]) => {
                let id = self.id("dash");
                let mut dashboard = body;
                let path = format!(
                    "{}/{}.lvdash.json",
                    str_of(&dashboard, "parent_path"),
                    str_of(&dashboard, "display_name")
                );
                dashboard["dashboard_id"] = json!(id);
                dashboard["path"] = json!(path);
                self.dashboards.push(dashboard);
                ok(json!({ "dashboard_id": id }))
            }
            (Method::Patch, ["2.0", "lakeview", "dashboards", id]) => {
                let Some(dashboard) = self.dashboards.iter_mut().find(|d| id_eq(d, "dashboard_id", id))
                else {
                    return not_found("dashboard");
                };
                if let Some(fields) = body.as_object() {
                    for (key, value) in fields {
                        dashboard[key.as_str()] = value.clone();
                    }
                }
                ok(json!({ "dashboard_id": id }))
            }

            // Query rooms
            (Method::Get, ["2.0", "data-rooms"]) => ok(json!({ "data_rooms": self.rooms })),
            (Method::Post, ["2.0", "data-rooms"]) => {
                let taken = self.rooms.iter().any(|r| {
                    str_of(r, "display_name") == str_of(&body, "display_name")
                        && str_of(r, "parent_folder") == str_of(&body, "parent_folder")
                });
                if taken {
                    return error(400, "RESOURCE_ALREADY_EXISTS", "A room with this name already exists");
                }
                let id = self.id("room");
                let mut room = body;
                room["id"] = json!(id);
                self.rooms.push(room);
                ok(json!({ "id": id }))
            }
            (Method::Patch, ["2.0", "data-rooms", id]) => {
                if self.rooms.iter().any(|r| id_eq(r, "id", id)) {
                    ok(json!({ "id": id }))
                } else {
                    not_found("room")
                }
            }
            (Method::Post, ["2.0", "data-rooms", id, "curated-questions", "batch-actions"]) => {
                let questions = body["actions"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|action| action["curated_question"].clone());
                self.room_questions
                    .entry((*id).to_string())
                    .or_default()
                    .extend(questions);
                ok(json!({}))
            }
            (Method::Get, ["2.0", "data-rooms", id, "curated-questions"]) => {
                ok(json!({ "curated_questions": self.room_questions.get(*id).cloned().unwrap_or_default() }))
            }
            (Method::Post, ["2.0", "data-rooms", id, "instructions"]) => {
                self.room_instructions
                    .entry((*id).to_string())
                    .or_default()
                    .push(body);
                ok(json!({}))
            }
            (Method::Get, ["2.0", "data-rooms", id, "instructions"]) => {
                ok(json!({ "instructions": self.room_instructions.get(*id).cloned().unwrap_or_default() }))
            }

            // Repos
            (Method::Get, ["2.0", "repos"]) => {
                let prefix = request.query_param("path_prefix").unwrap_or_default();
                let repos: Vec<&Value> = self
                    .repos
                    .iter()
                    .filter(|r| str_of(r, "path").starts_with(prefix))
                    .collect();
                ok(json!({ "repos": repos }))
            }
            (Method::Post, ["2.0", "repos"]) => {
                let path = str_of(&body, "path").to_string();
                if !self.parent_exists(&path) {
                    return not_found("parent folder");
                }
                if self.repos.iter().any(|r| str_of(r, "path") == path) {
                    return error(400, "RESOURCE_ALREADY_EXISTS", "Path already exists");
                }
                let id = self.numeric_id();
                let mut repo = body;
                repo["id"] = json!(id);
                self.repos.push(repo);
                ok(json!({ "id": id, "path": path }))
            }
            (Method::Patch, ["2.0", "repos", id]) => {
                let Some(repo) = self.repos.iter_mut().find(|r| id_eq(r, "id", id)) else {
                    return not_found("repo");
                };
                repo["branch"] = body["branch"].clone();
                ok(json!({}))
            }

            // Unity catalog
            (Method::Get, ["2.1", "unity-catalog", "tables", name]) => {
                if self.tables.contains(*name) {
                    ok(json!({ "full_name": name }))
                } else {
                    error(404, "TABLE_OR_VIEW_NOT_FOUND", &format!("{name} not found"))
                }
            }
            (Method::Get, ["2.1", "unity-catalog", "schemas", name]) => {
                if self.schemas.contains(*name) {
                    ok(json!({ "full_name": name }))
                } else {
                    not_found(name)
                }
            }
            (Method::Post, ["2.1", "unity-catalog", "schemas"]) => {
                let name = format!("{}.{}", str_of(&body, "catalog_name"), str_of(&body, "name"));
                self.schemas.insert(name.clone());
                ok(json!({ "full_name": name }))
            }
            (Method::Post, ["2.1", "unity-catalog", "volumes"]) => {
                let name = format!(
                    "{}.{}.{}",
                    str_of(&body, "catalog_name"),
                    str_of(&body, "schema_name"),
                    str_of(&body, "name")
                );
                if !self.volumes.insert(name.clone()) {
                    return error(409, "RESOURCE_ALREADY_EXISTS", &format!("{name} already exists"));
                }
                ok(json!({ "full_name": name }))
            }

            _ => error(404, "ENDPOINT_NOT_FOUND", &format!("no fake for {}", request.path)),
        }
    }
}

/// `` `a`.`b`.`c` `` of a CTAS statement, as `a.b.c`
fn created_table(statement: &str) -> Option<String> {
    let pattern = Regex::new(r"CREATE TABLE IF NOT EXISTS `([^`]+)`\.`([^`]+)`\.`([^`]+)` USING")
        .ok()?;
    let caps = pattern.captures(statement)?;
    Some(format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]))
}

/// Stateful stand-in for a workspace
#[derive(Debug, Clone)]
pub struct FakeWorkspace {
    state: Arc<Mutex<State>>,
    transport: MockTransport,
}

impl Default for FakeWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorkspace {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(State {
            user: USER.to_string(),
            ..State::default()
        }));
        let routed = Arc::clone(&state);
        let transport = MockTransport::new(move |request| {
            routed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .route(request)
        });
        Self { state, transport }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn client(&self) -> WorkspaceClient {
        WorkspaceClient::new(Arc::new(self.transport.clone())).with_retry(RetryPolicy::no_retry())
    }

    pub fn context(&self, settings: InstallSettings) -> InstallContext {
        InstallContext::new(self.client(), settings)
    }

    /// Answer `method` on paths starting with `prefix` with an error, always
    pub fn fail(&self, method: &str, prefix: &str, status: u16, body: Value) {
        self.inject(method, prefix, status, body, false);
    }

    /// Same as [`fail`](Self::fail) for the next matching call only
    pub fn fail_once(&self, method: &str, prefix: &str, status: u16, body: Value) {
        self.inject(method, prefix, status, body, true);
    }

    fn inject(&self, method: &str, prefix: &str, status: u16, body: Value, once: bool) {
        self.with_state(|s| {
            s.injected.push(Injected {
                method: method.to_string(),
                prefix: prefix.to_string(),
                status,
                body,
                once,
            })
        });
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.transport.calls()
    }

    /// Calls with exactly this method and path
    pub fn count_calls(&self, method: &str, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method.as_str() == method && c.path == path)
            .count()
    }

    /// Bodies of the calls with this method and path
    pub fn bodies(&self, method: &str, path: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.method.as_str() == method && c.path == path)
            .filter_map(|c| c.body)
            .collect()
    }

    pub fn set_user(&self, user: &str) {
        self.with_state(|s| s.user = user.to_string());
    }

    pub fn set_stuck_runs(&self, stuck: bool) {
        self.with_state(|s| s.stuck_runs = stuck);
    }

    pub fn add_folder(&self, path: &str) {
        self.with_state(|s| s.mkdirs(path));
    }

    pub fn add_table(&self, full_name: &str) {
        self.with_state(|s| s.tables.insert(full_name.to_string()));
    }

    pub fn add_warehouse(&self, name: &str, state: &str) -> String {
        self.with_state(|s| {
            let id = s.id("wh");
            s.warehouses
                .push(json!({ "id": id, "name": name, "state": state }));
            id
        })
    }

    pub fn folder_exists(&self, path: &str) -> bool {
        self.with_state(|s| s.folders.contains_key(path))
    }

    /// Imported document as text, with its import format
    pub fn imported(&self, path: &str) -> Option<(String, String)> {
        self.with_state(|s| {
            s.imports
                .get(path)
                .map(|(format, bytes)| (format.clone(), String::from_utf8_lossy(bytes).into_owned()))
        })
    }

    pub fn imported_paths(&self) -> Vec<String> {
        self.with_state(|s| s.imports.keys().cloned().collect())
    }

    pub fn statements(&self) -> Vec<String> {
        self.with_state(|s| s.statements.clone())
    }

    pub fn pipelines(&self) -> Vec<Value> {
        self.with_state(|s| s.pipelines.clone())
    }

    pub fn jobs(&self) -> Vec<Value> {
        self.with_state(|s| s.jobs.clone())
    }

    pub fn dashboards(&self) -> Vec<Value> {
        self.with_state(|s| s.dashboards.clone())
    }

    pub fn rooms(&self) -> Vec<Value> {
        self.with_state(|s| s.rooms.clone())
    }

    /// Curated questions and instructions of a room
    pub fn room_items(&self, id: &str) -> (Vec<Value>, Vec<Value>) {
        self.with_state(|s| {
            (
                s.room_questions.get(id).cloned().unwrap_or_default(),
                s.room_instructions.get(id).cloned().unwrap_or_default(),
            )
        })
    }

    pub fn warehouses(&self) -> Vec<Value> {
        self.with_state(|s| s.warehouses.clone())
    }
}

/// Bundles held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryBundles {
    bundles: BTreeMap<String, (String, BTreeMap<String, Vec<u8>>)>,
    templates: BTreeMap<String, Vec<u8>>,
}

impl MemoryBundles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(mut self, name: &str, descriptor: Value) -> Self {
        self.bundles
            .insert(name.to_string(), (descriptor.to_string(), BTreeMap::new()));
        self
    }

    pub fn with_file(mut self, name: &str, relative: &str, content: impl Into<Vec<u8>>) -> Self {
        if let Some((_, files)) = self.bundles.get_mut(name) {
            files.insert(relative.to_string(), content.into());
        }
        self
    }

    pub fn with_template(mut self, file: &str, content: impl Into<Vec<u8>>) -> Self {
        self.templates.insert(file.to_string(), content.into());
        self
    }
}

impl BundleSource for MemoryBundles {
    fn names(&self) -> Result<Vec<String>> {
        Ok(self.bundles.keys().cloned().collect())
    }

    fn descriptor(&self, name: &str) -> Result<Option<String>> {
        Ok(self.bundles.get(name).map(|(descriptor, _)| descriptor.clone()))
    }

    fn read(&self, name: &str, relative: &str) -> Result<Vec<u8>> {
        self.bundles
            .get(name)
            .and_then(|(_, files)| files.get(relative))
            .cloned()
            .with_context(|| format!("{name} has no file {relative}"))
    }

    fn template(&self, file: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.templates.get(file).cloned())
    }
}

/// A minimal notebook with one markdown cell
pub fn notebook(markdown: &str) -> Vec<u8> {
    json!({
        "cells": [{ "cell_type": "markdown", "metadata": {}, "source": [markdown] }],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    })
    .to_string()
    .into_bytes()
}
