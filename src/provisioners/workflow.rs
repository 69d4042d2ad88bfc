//! Scheduled workflows (jobs)
//!
//! The definition is rendered with the ids provisioned by earlier stages.
//! An existing job is reset in place, after its in-flight runs were
//! cancelled and have finished.

use provision::{
    MergePolicy, PollStatus, ProvisionError, Provisioned, Provisioner, RUNTIME_ASSIGNED,
    ResourceKind, merge,
};
use serde_json::{Value, json};

use super::cluster::cloud_defaults;
use super::{find_by, id_of, rejected};
use crate::context::{InstallContext, InstallSettings};
use crate::descriptor::WorkflowSpec;
use crate::template::TemplateEngine;

#[derive(Debug)]
pub struct WorkflowProvisioner {
    id: String,
    settings: Result<Value, String>,
    start_on_install: bool,
    unresolved: Vec<String>,
}

/// Jobs API ids are integers
pub(crate) fn job_id_value(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| json!(id), Value::from)
}

fn job_cluster_defaults(settings: &InstallSettings) -> Value {
    let mut defaults = json!({
        "spark_version": "15.4.x-scala2.12",
        "data_security_mode": "SINGLE_USER",
        "custom_tags": {
            "project": "lakebundle",
            "bundle": settings.bundle,
            "install_date": settings.today,
        },
    });
    merge(&mut defaults, &cloud_defaults(settings.cloud), &MergePolicy::overwrite());
    defaults
}

impl WorkflowProvisioner {
    pub fn new(spec: &WorkflowSpec, engine: &TemplateEngine) -> Self {
        let rendered = engine.render_dynamic(&spec.definition.to_string());
        let settings = serde_json::from_str::<Value>(&rendered.text)
            .map(|definition| definition.get("settings").cloned().unwrap_or_default())
            .map_err(|e| format!("workflow definition is not valid JSON after rendering: {e}"));
        Self {
            id: spec.id.clone(),
            settings,
            start_on_install: spec.start_on_install,
            unresolved: rendered.unresolved,
        }
    }

    pub fn name(&self) -> &str {
        self.settings
            .as_ref()
            .ok()
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    /// Job settings as submitted
    pub fn job_settings(&self, settings: &InstallSettings) -> Result<Value, ProvisionError> {
        let mut job = self.settings.clone().map_err(ProvisionError::new)?;

        if settings.serverless {
            if let Some(fields) = job.as_object_mut() {
                fields.remove("job_clusters");
            }
            if let Some(tasks) = job.get_mut("tasks").and_then(Value::as_array_mut) {
                for task in tasks.iter_mut().filter_map(Value::as_object_mut) {
                    task.remove("job_cluster_key");
                    task.remove("new_cluster");
                }
            }
            return Ok(job);
        }

        let defaults = job_cluster_defaults(settings);
        let policy = MergePolicy::overwrite().preserving(RUNTIME_ASSIGNED);
        if let Some(clusters) = job.get_mut("job_clusters").and_then(Value::as_array_mut) {
            for cluster in clusters.iter_mut() {
                let Some(new_cluster) = cluster.get_mut("new_cluster") else {
                    continue;
                };
                merge(new_cluster, &defaults, &policy);
                if let (Some(pool), Some(fields)) =
                    (&settings.instance_pool_id, new_cluster.as_object_mut())
                {
                    fields.insert("instance_pool_id".to_string(), json!(pool));
                    fields.remove("node_type_id");
                    fields.remove("driver_node_type_id");
                }
            }
        }
        Ok(job)
    }

    fn find(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        let name = self.name();
        let found = find_by(
            &ctx.client,
            "2.1/jobs/list",
            &[("limit", "25"), ("name", name)],
            "jobs",
            "settings.name",
            name,
        )?;
        Ok(found.and_then(|job| id_of(&job, "job_id")))
    }

    /// Cancel the job's runs and wait until none is active. A job is never
    /// reset while one of its runs may still be going.
    fn drain_runs(&self, ctx: &InstallContext, job_id: &str) -> Result<(), ProvisionError> {
        let body = json!({ "job_id": job_id_value(job_id) });
        let response = ctx.client.post("2.1/jobs/runs/cancel-all", &body)?;
        if response.is_error() {
            return Err(rejected("could not cancel runs", &body, response));
        }
        let outcome = provision::poll_until(&ctx.poll().job_runs, |_| {
            let runs = ctx.client.get(
                "2.1/jobs/runs/list",
                &[("job_id", job_id), ("active_only", "true")],
            )?;
            let active = runs
                .body
                .get("runs")
                .and_then(Value::as_array)
                .is_some_and(|runs| !runs.is_empty());
            Ok::<_, ProvisionError>(if active {
                PollStatus::Pending
            } else {
                PollStatus::Done
            })
        })?;
        if !outcome.is_completed() {
            return Err(ProvisionError::new(format!(
                "runs of job {job_id} are still active, not resetting it"
            )));
        }
        Ok(())
    }
}

impl Provisioner<InstallContext> for WorkflowProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Workflow
    }

    fn logical_id(&self) -> String {
        self.id.clone()
    }

    fn description(&self) -> String {
        format!("Workflow {}", self.name())
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let job = self.job_settings(&ctx.settings)?;
        let warnings: Vec<String> = self
            .unresolved
            .iter()
            .map(|token| format!("unresolved reference {token}"))
            .collect();

        let provisioned = match self.find(ctx)? {
            Some(job_id) => {
                self.drain_runs(ctx, &job_id)?;
                let body = json!({ "job_id": job_id_value(&job_id), "new_settings": job });
                let response = ctx.client.post("2.1/jobs/reset", &body)?;
                if response.is_error() {
                    return Err(rejected("could not reset workflow", &body, response));
                }
                Provisioned::updated(job_id)
            }
            None => {
                let response = ctx.client.post("2.1/jobs/create", &job)?;
                match response.id_field("job_id").filter(|_| !response.is_error()) {
                    Some(job_id) => Provisioned::created(job_id),
                    None => return Err(rejected("could not create workflow", &job, response)),
                }
            }
        };

        let mut provisioned = provisioned
            .named(self.name())
            .meta("start_on_install", self.start_on_install.to_string());
        for warning in warnings {
            provisioned = provisioned.warn(warning);
        }
        Ok(provisioned)
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        self.find(ctx)
    }
}
