//! Installation orchestrator
//!
//! One call to [`Installer::install`] runs a whole installation:
//!
//! ```text
//! identity -> descriptor -> install location -> folder
//!   -> compute   {cluster, warehouse, repos}
//!   -> data      {pipelines, data loads}
//!   -> jobs      {workflows, query rooms}
//!   -> dashboards
//!   -> content upload -> pipeline updates / job runs -> report
//! ```
//!
//! Stages are joined fully before the next one starts. Inside a stage
//! failures are isolated: every spec yields exactly one result and the
//! installation carries on. Only the errors in [`InstallError`] stop it, and
//! they all happen before the first resource is touched.

use notebook::LinkTable;
use provision::{
    ConfirmCallback, ExecuteOptions, ProgressCallback, ProvisionResult, ResourceKind, Stage,
    execute_stage,
};
use serde_json::{Value, json};

use crate::bundle::BundleSource;
use crate::config::InstallerConfig;
use crate::content;
use crate::context::{InstallContext, InstallSettings};
use crate::descriptor::{BundleDescriptor, schema_from_name};
use crate::error::InstallError;
use crate::provisioners::workflow::job_id_value;
use crate::provisioners::{
    ClusterProvisioner, DashboardProvisioner, DataLoadProvisioner, PipelineProvisioner,
    QueryRoomProvisioner, RepoProvisioner, WarehouseProvisioner, WorkflowProvisioner,
};
use crate::report::InstallationReport;
use crate::template::{SchemaRewrite, TemplateEngine, TemplateVars};
use wsclient::WorkspaceClient;

/// Default install folder, under the user's home
pub const DEFAULT_INSTALL_DIR: &str = "lakebundle";

/// Folders an installation may never be placed in, nor delete
const PROTECTED_ROOTS: &[&str] = &[
    "/",
    "/Users",
    "/Repos",
    "/Shared",
    "/Workspace",
    "/Workspace/Users",
    "/Workspace/Repos",
    "/Workspace/Shared",
];

/// What the caller asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    pub bundle: String,
    /// Parent of the bundle folder; defaults to `/Users/<user>/lakebundle`
    pub path: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    /// Name of an existing SQL warehouse to prefer
    pub warehouse: Option<String>,
    /// Replace an existing bundle folder
    pub overwrite: bool,
    pub serverless: bool,
    pub skip_dashboards: bool,
    pub skip_query_rooms: bool,
    /// `kind` or `kind.logical_id`; other specs are only looked up
    pub only: Option<String>,
    /// Look everything up, change nothing
    pub dry_run: bool,
    /// Worker pool size; the config value when unset
    pub jobs: Option<usize>,
}

impl InstallRequest {
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Install location
// ============================================================================

fn is_protected(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    trimmed.is_empty() || PROTECTED_ROOTS.contains(&trimmed)
}

/// Resolve the folder bundles are installed in.
///
/// No path gives `/Users/<user>/lakebundle`; relative paths (with or without
/// a leading `./`) are taken from the user's home. Trailing slashes are
/// dropped. `..` segments and protected roots are rejected.
pub fn resolve_install_path(path: Option<&str>, username: &str) -> Result<String, InstallError> {
    let home = format!("/Users/{username}");
    let raw = match path.map(str::trim) {
        None | Some("") => return Ok(format!("{home}/{DEFAULT_INSTALL_DIR}")),
        Some(raw) => raw,
    };

    if raw.split('/').any(|segment| segment == "..") {
        return Err(InstallError::invalid_path(raw, "'..' is not allowed"));
    }
    let resolved = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("{home}/{}", raw.trim_start_matches("./"))
    };
    let resolved = resolved.trim_end_matches('/').to_string();

    if is_protected(&resolved) {
        return Err(InstallError::invalid_path(raw, "protected workspace folder"));
    }
    Ok(resolved)
}

/// Catalog and schema a bundle is installed into
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    default_catalog: String,
    default_schema: String,
    custom_schema_supported: bool,
    catalog: String,
    schema: String,
}

impl Target {
    /// Read from the raw descriptor, before any token is substituted:
    /// catalog and schema are token values themselves.
    fn resolve(raw: &Value, name: &str, request: &InstallRequest) -> Result<Self, InstallError> {
        let default_catalog = raw
            .get("default_catalog")
            .and_then(Value::as_str)
            .unwrap_or("main")
            .to_string();
        let default_schema = raw
            .get("default_schema")
            .and_then(Value::as_str)
            .map_or_else(|| schema_from_name(name), str::to_string);
        let custom_schema_supported = raw
            .get("custom_schema_supported")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let catalog = request.catalog.clone().unwrap_or_else(|| default_catalog.clone());
        let schema = request.schema.clone().unwrap_or_else(|| default_schema.clone());
        let location = format!("{catalog}.{schema}");

        if !custom_schema_supported && (catalog != default_catalog || schema != default_schema) {
            return Err(InstallError::invalid_path(
                location,
                format!("bundle '{name}' only installs into {default_catalog}.{default_schema}"),
            ));
        }
        if catalog.contains('-') || schema.contains('-') {
            return Err(InstallError::invalid_path(
                location,
                "catalog and schema names cannot contain '-'",
            ));
        }
        if catalog.trim().is_empty() || schema.trim().is_empty() {
            return Err(InstallError::invalid_path(location, "catalog and schema are required"));
        }

        Ok(Self {
            default_catalog,
            default_schema,
            custom_schema_supported,
            catalog,
            schema,
        })
    }

    fn rewrite(&self) -> SchemaRewrite {
        SchemaRewrite::new(
            self.custom_schema_supported,
            &self.default_catalog,
            &self.default_schema,
            &self.catalog,
            &self.schema,
        )
    }
}

// ============================================================================
// Installer
// ============================================================================

/// Installs bundles from one bundle source into one workspace
pub struct Installer<'a> {
    client: WorkspaceClient,
    bundles: &'a dyn BundleSource,
    config: &'a InstallerConfig,
}

impl<'a> Installer<'a> {
    pub fn new(client: WorkspaceClient, bundles: &'a dyn BundleSource, config: &'a InstallerConfig) -> Self {
        Self {
            client,
            bundles,
            config,
        }
    }

    fn host(&self) -> String {
        self.config
            .host
            .clone()
            .unwrap_or_else(|| "the workspace".to_string())
    }

    /// Current user, which also validates the credential
    fn identity(&self) -> Result<String, InstallError> {
        let response = self.client.get("2.0/preview/scim/v2/Me", &[])?;
        if response.is_error() {
            return Err(InstallError::InvalidCredential {
                host: self.host(),
                message: response.message(),
            });
        }
        let user = response.str_field("userName").map(str::to_string);
        match (self.config.username.clone(), user) {
            (Some(configured), _) => Ok(configured),
            (None, Some(user)) => Ok(user),
            (None, None) => Err(InstallError::InvalidCredential {
                host: self.host(),
                message: "identity has no user name".to_string(),
            }),
        }
    }

    fn raw_descriptor(&self, name: &str) -> Result<String, InstallError> {
        let unknown = || InstallError::UnknownBundle {
            name: name.to_string(),
            available: self.bundles.names().unwrap_or_default(),
        };
        if name.trim().is_empty() || name.contains('/') {
            return Err(unknown());
        }
        match self.bundles.descriptor(name) {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(unknown()),
            Err(err) => Err(InstallError::invalid_descriptor(name, format!("{err:#}"))),
        }
    }

    fn folder_exists(&self, path: &str) -> Result<bool, InstallError> {
        let response = self
            .client
            .get("2.0/workspace/get-status", &[("path", path)])?;
        if response.is_not_found() {
            return Ok(false);
        }
        if response.is_error() {
            return Err(InstallError::invalid_path(path, response.message()));
        }
        Ok(true)
    }

    /// Make the bundle folder empty and present. An existing folder is only
    /// deleted when overwrite was requested and confirmed.
    fn prepare_folder<F: ConfirmCallback>(
        &self,
        ctx: &InstallContext,
        request: &InstallRequest,
        confirm: &mut F,
        report: &mut InstallationReport,
    ) -> Result<(), InstallError> {
        let folder = &ctx.settings.bundle_folder;
        if is_protected(folder) {
            return Err(InstallError::invalid_path(folder.as_str(), "protected workspace folder"));
        }

        if self.folder_exists(folder)? {
            if !request.overwrite {
                return Err(InstallError::FolderExists { path: folder.clone() });
            }
            if request.dry_run {
                report.warn(format!("{folder} exists and would be replaced"));
                return Ok(());
            }
            let prompt = format!("Delete {folder} and everything in it?");
            let confirmed = confirm.confirm(&prompt).unwrap_or_else(|err| {
                log::warn!("Confirmation failed: {err:#}");
                false
            });
            if !confirmed {
                return Err(InstallError::Aborted { path: folder.clone() });
            }

            log::info!("Deleting {folder}");
            let response = self.client.post(
                "2.0/workspace/delete",
                &json!({ "path": folder, "recursive": true }),
            )?;
            if response.is_error() && !response.is_not_found() {
                return Err(InstallError::invalid_path(
                    folder.as_str(),
                    format!("could not delete: {}", response.message()),
                ));
            }
            ctx.reset_folders();
        }

        if request.dry_run {
            return Ok(());
        }
        ctx.ensure_folder(folder)
            .map_err(|err| InstallError::invalid_path(folder.as_str(), err.message))
    }

    /// Create the target schema when it is missing. Failures only warn: the
    /// schema may be managed by someone else.
    fn ensure_schema(&self, settings: &InstallSettings, report: &mut InstallationReport) {
        let full_name = format!("{}.{}", settings.catalog, settings.schema);
        match self
            .client
            .get(&format!("2.1/unity-catalog/schemas/{full_name}"), &[])
        {
            Ok(response) if !response.is_error() => return,
            Ok(response) if response.is_not_found() => {}
            Ok(response) => {
                report.warn(format!("could not check schema {full_name}: {}", response.message()));
                return;
            }
            Err(err) => {
                report.warn(format!("could not check schema {full_name}: {err}"));
                return;
            }
        }

        log::info!("Creating schema {full_name}");
        let body = json!({ "catalog_name": settings.catalog, "name": settings.schema });
        match self.client.post("2.1/unity-catalog/schemas", &body) {
            Ok(response) if !response.is_error() || response.is_conflict() => {}
            Ok(response) => {
                report.warn(format!("could not create schema {full_name}: {}", response.message()))
            }
            Err(err) => report.warn(format!("could not create schema {full_name}: {err}")),
        }
    }

    /// Run one installation.
    ///
    /// # Arguments
    /// * `request` - What to install and where
    /// * `progress` - Per-stage progress reporting
    /// * `confirm` - Asked before an existing bundle folder is deleted
    pub fn install<P, F>(
        &self,
        request: &InstallRequest,
        progress: &mut P,
        confirm: &mut F,
    ) -> Result<InstallationReport, InstallError>
    where
        P: ProgressCallback,
        F: ConfirmCallback,
    {
        let username = self.identity()?;
        let name = request.bundle.trim();
        let raw = self.raw_descriptor(name)?;
        let raw_value: Value = serde_json::from_str(&raw)
            .map_err(|e| InstallError::invalid_descriptor(name, e))?;

        let install_path = resolve_install_path(request.path.as_deref(), &username)?;
        let target = Target::resolve(&raw_value, name, request)?;
        let bundle_folder = format!("{install_path}/{name}");

        let mut engine = TemplateEngine::new(TemplateVars {
            user: username.clone(),
            catalog: target.catalog.clone(),
            schema: target.schema.clone(),
            bundle_name: name.to_string(),
            bundle_folder: bundle_folder.clone(),
            today: TemplateVars::today(),
        });
        let rendered = engine
            .render_static(&raw)
            .map_err(|e| InstallError::invalid_descriptor(name, e))?;
        let descriptor = BundleDescriptor::parse(&rendered)
            .map_err(|e| InstallError::invalid_descriptor(name, e))?;

        let fallback_cluster_id = self.config.fallback_cluster_id.clone();
        let settings = InstallSettings {
            bundle: name.to_string(),
            install_path,
            bundle_folder,
            catalog: target.catalog.clone(),
            schema: target.schema.clone(),
            username,
            cloud: self.config.cloud,
            serverless: request.serverless,
            warehouse_name: request.warehouse.clone(),
            use_current_cluster: request.serverless && fallback_cluster_id.is_some(),
            fallback_cluster_id,
            update_cluster_if_exists: self.config.update_cluster_if_exists,
            start_cluster: self.config.start_cluster,
            instance_pool_id: self.config.instance_pool_id.clone(),
            pipeline_policy_id: self.config.pipeline_policy_id.clone(),
            poll: self.config.poll.clone(),
            today: engine.vars().today.clone(),
        };
        let ctx = InstallContext::new(self.client.clone(), settings);

        let mut report = InstallationReport::new(
            name,
            &ctx.settings.bundle_folder,
            &ctx.settings.catalog,
            &ctx.settings.schema,
        );
        report.dry_run = request.dry_run;

        self.prepare_folder(&ctx, request, confirm, &mut report)?;
        if target.custom_schema_supported && !request.dry_run {
            self.ensure_schema(&ctx.settings, &mut report);
        }

        let opts = ExecuteOptions {
            dry_run: request.dry_run,
            jobs: request.jobs.unwrap_or(self.config.max_workers).max(1),
        };
        let only = request.only.as_deref();
        let schema = target.rewrite();
        log::info!(
            "Installing {name} into {} ({}.{})",
            ctx.settings.bundle_folder,
            ctx.settings.catalog,
            ctx.settings.schema
        );

        // compute
        let mut stage = Stage::new("compute");
        if !descriptor.create_cluster {
            log::debug!("Bundle {name} declares no cluster");
        } else if request.serverless && ctx.settings.fallback_cluster_id.is_none() {
            report.extend_results([ProvisionResult::skipped(
                ResourceKind::Cluster,
                "cluster",
                "serverless installation, no cluster needed",
            )]);
        } else {
            stage.push(Box::new(ClusterProvisioner::new(
                descriptor.cluster.clone(),
                descriptor.cluster_libraries.clone(),
            )));
        }
        if descriptor.needs_warehouse() || request.warehouse.is_some() {
            stage.push(Box::new(WarehouseProvisioner::new()));
        }
        for repo in &descriptor.repos {
            stage.push(Box::new(RepoProvisioner::new(repo.clone())));
        }
        run_stage(stage.filter_by_target(only), &ctx, &opts, progress, &mut report, &mut engine)?;

        let warehouse_id = report
            .result(ResourceKind::Warehouse, "shared")
            .and_then(|r| r.provisioned_uid.clone());

        // data
        let mut stage = Stage::new("data");
        for spec in &descriptor.pipelines {
            let mut spec = spec.clone();
            spec.definition = render_value(&engine, &spec.definition);
            stage.push(Box::new(PipelineProvisioner::new(spec, warehouse_id.clone())));
        }
        for folder in &descriptor.data_folders {
            stage.push(Box::new(DataLoadProvisioner::new(folder.clone(), warehouse_id.clone())));
        }
        run_stage(stage.filter_by_target(only), &ctx, &opts, progress, &mut report, &mut engine)?;

        // jobs
        let mut stage = Stage::new("jobs");
        for spec in &descriptor.workflows {
            stage.push(Box::new(WorkflowProvisioner::new(spec, &engine)));
        }
        if !request.skip_query_rooms {
            for room in &descriptor.genie_rooms {
                stage.push(Box::new(QueryRoomProvisioner::new(
                    room.clone(),
                    warehouse_id.clone(),
                    schema.clone(),
                )));
            }
        }
        run_stage(stage.filter_by_target(only), &ctx, &opts, progress, &mut report, &mut engine)?;
        if request.skip_query_rooms {
            report.extend_results(descriptor.genie_rooms.iter().map(|room| {
                ProvisionResult::skipped(ResourceKind::QueryRoom, &room.id, "query rooms skipped")
            }));
        }

        // dashboards
        let mut stage = Stage::new("dashboards");
        if !request.skip_dashboards {
            for spec in &descriptor.dashboards {
                let definition = self
                    .bundles
                    .read(name, &spec.definition_path())
                    .map_err(|e| format!("{e:#}"))
                    .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()))
                    .map(|text| engine.render_dynamic(&schema.apply(&text)).text);
                let room_uid = spec.genie_room_id.as_deref().and_then(|room| {
                    report
                        .result(ResourceKind::QueryRoom, room)
                        .and_then(|r| r.provisioned_uid.clone())
                });
                stage.push(Box::new(DashboardProvisioner::new(
                    spec.clone(),
                    definition,
                    warehouse_id.clone(),
                    room_uid,
                )));
            }
        }
        run_stage(stage.filter_by_target(only), &ctx, &opts, progress, &mut report, &mut engine)?;
        if request.skip_dashboards {
            report.extend_results(descriptor.dashboards.iter().map(|dashboard| {
                ProvisionResult::skipped(ResourceKind::Dashboard, &dashboard.id, "dashboards skipped")
            }));
        }

        if request.dry_run {
            return Ok(report);
        }

        let links = LinkTable::from_results(&report.results);
        let uploads = content::plan(&ctx, self.bundles, &descriptor);
        log::info!("Uploading {} documents", uploads.len());
        report.documents = content::upload_all(&ctx, &uploads, &links, &schema, opts.jobs);

        launch(&ctx, &mut report);
        Ok(report)
    }
}

/// Run one stage, record its ids for later stages and append its results
fn run_stage<P: ProgressCallback>(
    stage: Stage<InstallContext>,
    ctx: &InstallContext,
    opts: &ExecuteOptions,
    progress: &mut P,
    report: &mut InstallationReport,
    engine: &mut TemplateEngine,
) -> Result<(), InstallError> {
    if stage.is_empty() {
        return Ok(());
    }
    let results = execute_stage(&stage, ctx, opts, progress)
        .map_err(|e| InstallError::WorkerPool(e.to_string()))?;

    for result in &results {
        if let Some(uid) = &result.provisioned_uid {
            engine.set_id(result.kind, &result.logical_id, uid);
            if result.kind == ResourceKind::Warehouse {
                engine.set_shared_warehouse(uid);
            }
        }
    }
    report.extend_results(results);
    Ok(())
}

/// Substitute the dynamic tokens known so far inside a JSON definition
fn render_value(engine: &TemplateEngine, value: &Value) -> Value {
    let rendered = engine.render_dynamic(&value.to_string());
    serde_json::from_str(&rendered.text).unwrap_or_else(|_| value.clone())
}

fn flagged(result: &ProvisionResult, key: &str) -> bool {
    result.is_success()
        && result.provisioned_uid.is_some()
        && !result.metadata.contains_key("lookup_only")
        && result.metadata.get(key).map(String::as_str) == Some("true")
}

/// Start pipeline updates and job runs requested by the descriptor, once
/// content is in place. Failures are warnings on the result.
fn launch(ctx: &InstallContext, report: &mut InstallationReport) {
    for result in &mut report.results {
        let Some(uid) = result.provisioned_uid.clone() else {
            continue;
        };
        match result.kind {
            ResourceKind::Pipeline if flagged(result, "run_after_creation") => {
                log::info!("Starting full refresh of pipeline {uid}");
                match ctx.client.post(
                    &format!("2.0/pipelines/{uid}/updates"),
                    &json!({ "full_refresh": true }),
                ) {
                    Ok(response) if !response.is_error() => {
                        if let Some(update) = response.id_field("update_id") {
                            result.metadata.insert("update_id".to_string(), update);
                        }
                    }
                    Ok(response) => result.add_warning(format!(
                        "could not start pipeline: {}",
                        response.message()
                    )),
                    Err(err) => result.add_warning(format!("could not start pipeline: {err}")),
                }
            }
            ResourceKind::Workflow if flagged(result, "start_on_install") => {
                log::info!("Starting job {uid}");
                match ctx
                    .client
                    .post("2.1/jobs/run-now", &json!({ "job_id": job_id_value(&uid) }))
                {
                    Ok(response) if !response.is_error() => {
                        if let Some(run) = response.id_field("run_id") {
                            result.metadata.insert("run_id".to_string(), run);
                        }
                    }
                    Ok(response) => {
                        result.add_warning(format!("could not start job: {}", response.message()))
                    }
                    Err(err) => result.add_warning(format!("could not start job: {err}")),
                }
            }
            _ => {}
        }
    }
}
