//! Shared SQL warehouse
//!
//! An existing warehouse is preferred over creating one, in this order:
//! the reserved shared warehouse, the warehouse the user asked for, any
//! running warehouse, any warehouse. Only when the workspace has none is a
//! warehouse created, serverless first and classic when serverless is not
//! available.

use provision::{ProvisionError, Provisioned, Provisioner, ResourceKind};
use serde_json::{Value, json};

use super::{id_of, rejected};
use crate::context::InstallContext;

/// Name of the warehouse created and reused by every installation
pub const RESERVED_WAREHOUSE: &str = "lakebundle-shared-warehouse";

#[derive(Debug, Default)]
pub struct WarehouseProvisioner;

fn name_of(warehouse: &Value) -> &str {
    warehouse
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Pick an existing warehouse, and why when the requested one was not found
fn choose<'a>(
    warehouses: &'a [Value],
    requested: Option<&str>,
) -> (Option<&'a Value>, Option<String>) {
    if let Some(reserved) = warehouses.iter().find(|w| name_of(w) == RESERVED_WAREHOUSE) {
        return (Some(reserved), None);
    }

    let mut warning = None;
    if let Some(requested) = requested {
        match warehouses.iter().find(|w| name_of(w) == requested) {
            Some(found) => return (Some(found), None),
            None => {
                warning = Some(format!(
                    "warehouse '{requested}' not found, using another warehouse"
                ))
            }
        }
    }

    let running = warehouses
        .iter()
        .find(|w| w.get("state").and_then(Value::as_str) == Some("RUNNING"));
    (running.or_else(|| warehouses.first()), warning)
}

fn definition(name: &str, serverless: bool) -> Value {
    json!({
        "name": name,
        "cluster_size": "Small",
        "min_num_clusters": 1,
        "max_num_clusters": 1,
        "auto_stop_mins": 10,
        "tags": { "custom_tags": [{ "key": "project", "value": "lakebundle" }] },
        "spot_instance_policy": "COST_OPTIMIZED",
        "warehouse_type": "PRO",
        "enable_photon": true,
        "enable_serverless_compute": serverless,
        "channel": { "name": "CHANNEL_NAME_CURRENT" },
    })
}

impl WarehouseProvisioner {
    pub fn new() -> Self {
        Self
    }

    fn list(&self, ctx: &InstallContext) -> Result<Vec<Value>, ProvisionError> {
        Ok(ctx
            .client
            .pages("2.0/sql/warehouses", &[], "warehouses")
            .collect_items()?)
    }

    /// Create serverless, fall back to classic. A name conflict means
    /// another installation created the shared warehouse meanwhile: it is
    /// reused.
    fn create(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let mut last = None;

        for serverless in [true, false] {
            let body = definition(RESERVED_WAREHOUSE, serverless);
            let response = ctx.client.post("2.0/sql/warehouses", &body)?;
            if response.is_conflict() {
                let warehouses = self.list(ctx)?;
                let existing = warehouses
                    .iter()
                    .find(|w| name_of(w) == RESERVED_WAREHOUSE)
                    .and_then(|w| id_of(w, "id"));
                return match existing {
                    Some(id) => Ok(Provisioned::reused(id).named(RESERVED_WAREHOUSE)),
                    None => Err(rejected("could not create a SQL warehouse", &body, response)),
                };
            }
            match response.id_field("id").filter(|_| !response.is_error()) {
                Some(id) => {
                    let mut provisioned = Provisioned::created(id).named(RESERVED_WAREHOUSE);
                    if !serverless {
                        provisioned = provisioned.warn("serverless warehouses unavailable, created a classic warehouse");
                    }
                    return Ok(provisioned);
                }
                None => {
                    log::info!(
                        "Could not create {} warehouse: {}",
                        if serverless { "serverless" } else { "classic" },
                        response.message()
                    );
                    last = Some((body, response));
                }
            }
        }

        match last {
            Some((body, response)) => Err(rejected("could not create a SQL warehouse", &body, response)),
            None => Err(ProvisionError::new("could not create a SQL warehouse")),
        }
    }
}

impl Provisioner<InstallContext> for WarehouseProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Warehouse
    }

    fn logical_id(&self) -> String {
        "shared".to_string()
    }

    fn description(&self) -> String {
        "Shared SQL warehouse".to_string()
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let warehouses = self.list(ctx)?;
        let (found, warning) = choose(&warehouses, ctx.settings.warehouse_name.as_deref());

        let mut provisioned = match found.and_then(|w| id_of(w, "id").map(|id| (id, name_of(w)))) {
            Some((id, name)) => Provisioned::reused(id).named(name),
            None => self.create(ctx)?,
        };
        if let Some(warning) = warning {
            provisioned = provisioned.warn(warning);
        }
        Ok(provisioned)
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        let warehouses = self.list(ctx)?;
        let (found, _) = choose(&warehouses, ctx.settings.warehouse_name.as_deref());
        Ok(found.and_then(|w| id_of(w, "id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorkspace, settings};
    use provision::Outcome;

    #[test]
    fn test_choose_order() {
        let warehouses = vec![
            json!({ "id": "1", "name": "adhoc", "state": "STOPPED" }),
            json!({ "id": "2", "name": "bi", "state": "RUNNING" }),
            json!({ "id": "3", "name": RESERVED_WAREHOUSE, "state": "STOPPED" }),
        ];
        assert_eq!(choose(&warehouses, Some("bi")).0.unwrap()["id"], "3");
        assert_eq!(choose(&warehouses[..2], Some("adhoc")).0.unwrap()["id"], "1");
        assert_eq!(choose(&warehouses[..2], None).0.unwrap()["id"], "2");

        let (found, warning) = choose(&warehouses[..1], Some("missing"));
        assert_eq!(found.unwrap()["id"], "1");
        assert!(warning.unwrap().contains("'missing' not found"));
        assert!(choose(&[], None).0.is_none());
    }

    #[test]
    fn test_reuses_running_warehouse() {
        let workspace = FakeWorkspace::new();
        workspace.add_warehouse("adhoc", "STOPPED");
        let running = workspace.add_warehouse("bi", "RUNNING");
        let ctx = workspace.context(settings());

        let provisioned = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(provisioned.outcome, Outcome::Reused);
        assert_eq!(provisioned.uid, Some(running));
        assert_eq!(workspace.count_calls("POST", "2.0/sql/warehouses"), 0);
    }

    #[test]
    fn test_creates_serverless_then_reuses() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());

        let created = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(created.name.as_deref(), Some(RESERVED_WAREHOUSE));
        assert_eq!(
            workspace.bodies("POST", "2.0/sql/warehouses")[0]["enable_serverless_compute"],
            true
        );

        let again = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(again.outcome, Outcome::Reused);
        assert_eq!(again.uid, created.uid);
    }

    #[test]
    fn test_falls_back_to_classic() {
        let workspace = FakeWorkspace::new();
        workspace.fail_once(
            "POST",
            "2.0/sql/warehouses",
            400,
            json!({ "error_code": "INVALID_PARAMETER_VALUE", "message": "serverless is not enabled" }),
        );
        let ctx = workspace.context(settings());

        let created = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(created.warnings.len(), 1);
        let bodies = workspace.bodies("POST", "2.0/sql/warehouses");
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[1]["enable_serverless_compute"], false);
    }

    #[test]
    fn test_conflict_reuses_concurrent_warehouse() {
        let workspace = FakeWorkspace::new();
        let existing = workspace.add_warehouse(RESERVED_WAREHOUSE, "STARTING");
        // The first listing predates the other installation's create
        workspace.fail_once("GET", "2.0/sql/warehouses", 200, json!({ "warehouses": [] }));
        let ctx = workspace.context(settings());

        let provisioned = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(provisioned.outcome, Outcome::Reused);
        assert_eq!(provisioned.uid, Some(existing));
        assert_eq!(provisioned.name.as_deref(), Some(RESERVED_WAREHOUSE));
        assert_eq!(workspace.count_calls("POST", "2.0/sql/warehouses"), 1);
        assert_eq!(workspace.warehouses().len(), 1);
    }

    #[test]
    fn test_missing_requested_warehouse_warns() {
        let workspace = FakeWorkspace::new();
        workspace.add_warehouse("bi", "RUNNING");
        let mut s = settings();
        s.warehouse_name = Some("finance".to_string());
        let ctx = workspace.context(s);

        let provisioned = WarehouseProvisioner::new().provision(&ctx).unwrap();
        assert_eq!(provisioned.outcome, Outcome::Reused);
        assert_eq!(provisioned.warnings.len(), 1);
    }
}
