//! Interactive cluster for the bundle notebooks
//!
//! The definition is built as built-in defaults, overlaid with the cloud's
//! defaults, overlaid with the descriptor's `cluster` block. Any failure
//! degrades to the configured fallback cluster.

use provision::{
    MergePolicy, PollStatus, ProvisionError, Provisioned, Provisioner, ResourceKind, merge,
    poll_until,
};
use serde_json::{Value, json};

use super::{find_by, id_of, rejected};
use crate::config::Cloud;
use crate::context::{InstallContext, InstallSettings};

const SINGLE_NODE_KEY: &str = "spark.databricks.cluster.profile";

#[derive(Debug)]
pub struct ClusterProvisioner {
    overrides: Value,
    libraries: Vec<Value>,
}

fn builtin(settings: &InstallSettings) -> Value {
    json!({
        "cluster_name": format!("lakebundle-{}-{}", settings.user_name(), settings.bundle),
        "spark_version": "15.4.x-scala2.12",
        "autoscale": { "min_workers": 1, "max_workers": 2 },
        "autotermination_minutes": 60,
        "data_security_mode": "SINGLE_USER",
        "single_user_name": settings.username,
        "spark_conf": {},
        "custom_tags": {
            "project": "lakebundle",
            "bundle": settings.bundle,
            "install_date": settings.today,
        },
    })
}

pub(super) fn cloud_defaults(cloud: Cloud) -> Value {
    match cloud {
        Cloud::Aws => json!({
            "node_type_id": "i3.xlarge",
            "aws_attributes": { "availability": "SPOT_WITH_FALLBACK", "first_on_demand": 1 },
        }),
        Cloud::Azure => json!({
            "node_type_id": "Standard_DS3_v2",
            "azure_attributes": { "availability": "ON_DEMAND_AZURE" },
        }),
        Cloud::Gcp => json!({
            "node_type_id": "n1-highmem-4",
            "gcp_attributes": { "use_preemptible_executors": false },
        }),
    }
}

/// Replace `{"AWS": .., "AZURE": .., "GCP": ..}` by the current cloud's entry
fn resolve_cloud_key(definition: &mut Value, key: &str, cloud: Cloud) -> Result<(), ProvisionError> {
    let Some(value) = definition.get_mut(key) else {
        return Ok(());
    };
    if let Value::Object(per_cloud) = value {
        let resolved = per_cloud.get(cloud.as_str()).cloned().ok_or_else(|| {
            ProvisionError::new(format!(
                "cluster {key} has no entry for {cloud}; give one node type per cloud"
            ))
        })?;
        *value = resolved;
    }
    Ok(())
}

impl ClusterProvisioner {
    pub fn new(overrides: Value, libraries: Vec<Value>) -> Self {
        Self {
            overrides,
            libraries,
        }
    }

    /// Cluster definition for this installation
    pub fn definition(&self, settings: &InstallSettings) -> Result<Value, ProvisionError> {
        let policy = MergePolicy::overwrite();
        let mut definition = builtin(settings);
        merge(&mut definition, &cloud_defaults(settings.cloud), &policy);
        if self.overrides.is_object() {
            merge(&mut definition, &self.overrides, &policy);
        }

        resolve_cloud_key(&mut definition, "node_type_id", settings.cloud)?;
        resolve_cloud_key(&mut definition, "driver_node_type_id", settings.cloud)?;

        let single_node = definition
            .get("spark_conf")
            .and_then(|conf| conf.get(SINGLE_NODE_KEY))
            .and_then(Value::as_str)
            == Some("singleNode");
        if single_node && let Some(fields) = definition.as_object_mut() {
            fields.remove("autoscale");
            fields.insert("num_workers".to_string(), json!(0));
        }
        Ok(definition)
    }

    fn cluster_name(definition: &Value) -> String {
        definition
            .get("cluster_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn find(&self, ctx: &InstallContext, name: &str) -> Result<Option<String>, ProvisionError> {
        let found = find_by(&ctx.client, "2.0/clusters/list", &[], "clusters", "cluster_name", name)?;
        Ok(found.and_then(|c| id_of(&c, "cluster_id")))
    }

    /// Terminate a cluster and wait for `TERMINATED`; a warning when it does not get there
    fn stop(&self, ctx: &InstallContext, cluster_id: &str) -> Result<Option<String>, ProvisionError> {
        log::info!("Cluster {cluster_id} is in an invalid state, terminating it");
        ctx.client
            .post("2.0/clusters/delete", &json!({ "cluster_id": cluster_id }))?;
        let outcome = poll_until(&ctx.poll().cluster_stop, |_| {
            let status = ctx
                .client
                .get("2.0/clusters/get", &[("cluster_id", cluster_id)])?;
            Ok::<_, ProvisionError>(if status.str_field("state") == Some("TERMINATED") {
                PollStatus::Done
            } else {
                PollStatus::Pending
            })
        })?;
        Ok((!outcome.is_completed()).then(|| {
            format!("cluster {cluster_id} did not reach TERMINATED; stop it before re-installing")
        }))
    }

    fn edit(
        &self,
        ctx: &InstallContext,
        cluster_id: &str,
        definition: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<(), ProvisionError> {
        let mut edit = definition.clone();
        edit["cluster_id"] = json!(cluster_id);

        let mut response = ctx.client.post("2.0/clusters/edit", &edit)?;
        if response.error_code() == Some("INVALID_STATE") {
            warnings.extend(self.stop(ctx, cluster_id)?);
            response = ctx.client.post("2.0/clusters/edit", &edit)?;
        }
        if response.is_error() {
            return Err(rejected("could not update cluster", &edit, response));
        }
        Ok(())
    }

    fn start(&self, ctx: &InstallContext, cluster_id: &str) -> Result<Option<String>, ProvisionError> {
        let response = ctx
            .client
            .post("2.0/clusters/start", &json!({ "cluster_id": cluster_id }))?;
        if !response.is_error() {
            return Ok(None);
        }
        let message = response.message();
        let already_starting = response.error_code() == Some("INVALID_STATE")
            && (message.contains("Pending") || message.contains("Restarting"));
        if already_starting {
            log::info!("Cluster {cluster_id} is already starting");
            return Ok(None);
        }
        Ok(Some(format!("could not start cluster {cluster_id}: {message}")))
    }

    fn provision_dedicated(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let settings = &ctx.settings;
        let definition = self.definition(settings)?;
        let name = Self::cluster_name(&definition);
        let mut warnings = Vec::new();

        let (cluster_id, mut provisioned) = match self.find(ctx, &name)? {
            None => {
                let response = ctx.client.post("2.0/clusters/create", &definition)?;
                if response.error_code() == Some("PERMISSION_DENIED") {
                    return Err(rejected("not allowed to create clusters", &definition, response));
                }
                let Some(id) = response.id_field("cluster_id").filter(|_| !response.is_error())
                else {
                    return Err(rejected("could not create cluster", &definition, response));
                };
                (id.clone(), Provisioned::created(id))
            }
            Some(id) => {
                let provisioned = if settings.update_cluster_if_exists {
                    self.edit(ctx, &id, &definition, &mut warnings)?;
                    Provisioned::updated(id.clone())
                } else {
                    Provisioned::reused(id.clone())
                };
                if settings.start_cluster {
                    warnings.extend(self.start(ctx, &id)?);
                }
                (id, provisioned)
            }
        };

        if !self.libraries.is_empty() {
            let install = json!({ "cluster_id": cluster_id, "libraries": self.libraries });
            let response = ctx.client.post("2.0/libraries/install", &install)?;
            if response.is_error() {
                warnings.push(format!("could not install cluster libraries: {}", response.message()));
            }
        }

        provisioned = provisioned.named(name);
        for warning in warnings {
            provisioned = provisioned.warn(warning);
        }
        Ok(provisioned)
    }
}

impl Provisioner<InstallContext> for ClusterProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }

    fn logical_id(&self) -> String {
        "cluster".to_string()
    }

    fn description(&self) -> String {
        "Bundle cluster".to_string()
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let settings = &ctx.settings;
        if settings.use_current_cluster {
            return match &settings.fallback_cluster_id {
                Some(id) => Ok(Provisioned::reused(id.clone())
                    .named("current cluster")
                    .meta("mode", "current")),
                None => Err(ProvisionError::new(
                    "no current cluster configured (set fallback_cluster_id)",
                )),
            };
        }

        match self.provision_dedicated(ctx) {
            Ok(provisioned) => Ok(provisioned),
            Err(err) => match &settings.fallback_cluster_id {
                Some(fallback) => {
                    log::warn!("Cluster failed, falling back to {fallback}: {err}");
                    Ok(Provisioned::fallback(fallback.clone())
                        .named("fallback cluster")
                        .warn(format!(
                            "could not provision the bundle cluster, using cluster {fallback} instead: {err}"
                        )))
                }
                None => Err(err),
            },
        }
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        if ctx.settings.use_current_cluster {
            return Ok(ctx.settings.fallback_cluster_id.clone());
        }
        let definition = self.definition(&ctx.settings)?;
        self.find(ctx, &Self::cluster_name(&definition))
    }
}
