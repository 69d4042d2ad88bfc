//! Data pipelines
//!
//! Tables a pipeline reads from may only exist once the bundle notebooks
//! ran. They are created as empty placeholders before the pipeline is
//! submitted and dropped once it exists, so the pipeline definition
//! validates.

use provision::{MergePolicy, ProvisionError, Provisioned, Provisioner, ResourceKind, merge};
use serde_json::{Map, Value, json};

use super::{find_by, id_of, rejected};
use crate::context::{InstallContext, InstallSettings};
use crate::descriptor::PipelineSpec;
use crate::sql;

const EVENT_LOG_SUFFIX: &str = "event_log";

#[derive(Debug)]
pub struct PipelineProvisioner {
    spec: PipelineSpec,
    warehouse_id: Option<String>,
}

impl PipelineProvisioner {
    pub fn new(spec: PipelineSpec, warehouse_id: Option<String>) -> Self {
        Self { spec, warehouse_id }
    }

    pub fn name(&self) -> &str {
        self.spec.name().unwrap_or(&self.spec.id)
    }

    /// Definition as submitted, plus warnings about settings that were dropped
    pub fn definition(&self, settings: &InstallSettings) -> (Value, Vec<String>) {
        let mut pipeline = match &self.spec.definition {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        let mut warnings = Vec::new();

        if let Some(target) = pipeline.remove("target") {
            pipeline.entry("schema").or_insert(target);
        }
        pipeline
            .entry("catalog")
            .or_insert_with(|| json!(settings.catalog));
        pipeline
            .entry("schema")
            .or_insert_with(|| json!(settings.schema));
        pipeline.insert("channel".to_string(), json!("CURRENT"));
        pipeline.entry("event_log").or_insert_with(|| {
            json!({
                "catalog": settings.catalog,
                "schema": settings.schema,
                "name": format!("{}_{EVENT_LOG_SUFFIX}", self.spec.id.replace(['-', ' '], "_")),
            })
        });

        if settings.serverless {
            pipeline.remove("clusters");
            pipeline.remove("photon");
            pipeline.insert("serverless".to_string(), json!(true));
            if settings.pipeline_policy_id.is_some() {
                warnings.push("cluster policy ignored for a serverless pipeline".to_string());
            }
        } else {
            let tags = json!({
                "custom_tags": {
                    "project": "lakebundle",
                    "bundle": settings.bundle,
                    "install_date": settings.today,
                }
            });
            let clusters = pipeline
                .entry("clusters")
                .or_insert_with(|| json!([{ "label": "default" }]));
            if let Some(clusters) = clusters.as_array_mut() {
                for cluster in clusters.iter_mut() {
                    merge(cluster, &tags, &MergePolicy::keep_existing());
                    let Some(cluster) = cluster.as_object_mut() else {
                        continue;
                    };
                    if let Some(policy) = &settings.pipeline_policy_id {
                        cluster.insert("policy_id".to_string(), json!(policy));
                    }
                    if let Some(pool) = &settings.instance_pool_id {
                        cluster.insert("instance_pool_id".to_string(), json!(pool));
                        cluster.remove("node_type_id");
                        cluster.remove("enable_elastic_disk");
                        cluster.remove("aws_attributes");
                    }
                }
            }
        }
        (Value::Object(pipeline), warnings)
    }

    fn find(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        let found = find_by(
            &ctx.client,
            "2.0/pipelines",
            &[("max_results", "100")],
            "statuses",
            "name",
            self.name(),
        )?;
        Ok(found.and_then(|p| id_of(&p, "pipeline_id")))
    }

    /// Run a statement for each placeholder table. Without a warehouse the
    /// tables cannot be managed; that is reported, not fatal.
    fn placeholders(&self, ctx: &InstallContext, create: bool) -> Vec<String> {
        if self.spec.placeholder_tables.is_empty() {
            return Vec::new();
        }
        let Some(warehouse) = &self.warehouse_id else {
            return if create {
                vec!["no SQL warehouse, placeholder tables were not created".to_string()]
            } else {
                Vec::new()
            };
        };

        let mut warnings = Vec::new();
        for table in &self.spec.placeholder_tables {
            let qualified = ctx.settings.qualified_table(table);
            let statement = if create {
                format!(
                    "CREATE TABLE IF NOT EXISTS {qualified} (placeholder STRING) \
                     TBLPROPERTIES ('lakebundle.placeholder' = 'true')"
                )
            } else {
                format!("DROP TABLE IF EXISTS {qualified}")
            };
            if let Err(err) = sql::execute(&ctx.client, warehouse, &statement, ctx.statement_poll()) {
                warnings.push(format!("placeholder table {table}: {err}"));
            }
        }
        warnings
    }

    fn update(&self, ctx: &InstallContext, id: &str, definition: &Value) -> Result<(), ProvisionError> {
        let mut body = definition.clone();
        body["id"] = json!(id);
        let response = ctx.client.put(&format!("2.0/pipelines/{id}"), &body)?;
        if !response.is_error() {
            return Ok(());
        }

        let message = response.message();
        if response.error_code() == Some("CANNOT_SET_SCHEMA_FOR_EXISTING_PIPELINE")
            || message.to_lowercase().contains("migration")
        {
            return Err(rejected(
                "existing pipeline cannot be moved to the new catalog or schema; delete it and re-install",
                &body,
                response,
            ));
        }
        Err(rejected("could not update pipeline", &body, response))
    }

    fn create(&self, ctx: &InstallContext, definition: &Value) -> Result<Provisioned, ProvisionError> {
        let response = ctx.client.post("2.0/pipelines", definition)?;
        if response.error_code() == Some("FEATURE_DISABLED") {
            return Err(rejected("pipelines are not available in this workspace", definition, response));
        }
        if response.is_conflict() {
            log::info!("Pipeline {} was created concurrently, updating it", self.name());
            let Some(id) = self.find(ctx)? else {
                return Err(rejected("pipeline name conflict", definition, response));
            };
            self.update(ctx, &id, definition)?;
            return Ok(Provisioned::updated(id));
        }
        match response.id_field("pipeline_id").filter(|_| !response.is_error()) {
            Some(id) => Ok(Provisioned::created(id)),
            None => Err(rejected("could not create pipeline", definition, response)),
        }
    }

    fn grant(&self, ctx: &InstallContext, id: &str) -> Option<String> {
        let body = json!({
            "access_control_list": [{ "group_name": "users", "permission_level": "CAN_MANAGE" }]
        });
        match ctx
            .client
            .patch(&format!("2.0/preview/permissions/pipelines/{id}"), &body)
        {
            Ok(response) if !response.is_error() => None,
            Ok(response) => Some(format!("could not share pipeline: {}", response.message())),
            Err(err) => Some(format!("could not share pipeline: {err}")),
        }
    }
}

impl Provisioner<InstallContext> for PipelineProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Pipeline
    }

    fn logical_id(&self) -> String {
        self.spec.id.clone()
    }

    fn description(&self) -> String {
        format!("Pipeline {}", self.name())
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let (definition, mut warnings) = self.definition(&ctx.settings);

        let mut provisioned = match self.find(ctx)? {
            Some(id) => {
                self.update(ctx, &id, &definition)?;
                Provisioned::updated(id)
            }
            None => {
                warnings.extend(self.placeholders(ctx, true));
                let created = self.create(ctx, &definition);
                warnings.extend(self.placeholders(ctx, false));
                created?
            }
        };

        if let Some(uid) = provisioned.uid.clone() {
            warnings.extend(self.grant(ctx, &uid));
        }
        provisioned = provisioned
            .named(self.name())
            .meta("run_after_creation", self.spec.run_after_creation.to_string());
        for warning in warnings {
            provisioned = provisioned.warn(warning);
        }
        Ok(provisioned)
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        self.find(ctx)
    }
}
