//! Dashboards, created in the bundle's `_dashboards` folder

use provision::{ProvisionError, Provisioned, Provisioner, ResourceKind};
use regex::{NoExpand, Regex};
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::{id_of, rejected};
use crate::context::InstallContext;
use crate::descriptor::DashboardSpec;

static OVERRIDE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""overrideId"\s*:\s*"""#).unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

pub const DASHBOARD_FOLDER: &str = "_dashboards";

#[derive(Debug)]
pub struct DashboardProvisioner {
    spec: DashboardSpec,
    /// Serialized dashboard, or why it could not be read
    definition: Result<String, String>,
    warehouse_id: Option<String>,
    query_room_uid: Option<String>,
}

/// Point the dashboard's assistant at a query room: the first empty
/// `"overrideId"` gets the room id
pub fn inject_room(definition: &str, room_uid: &str) -> String {
    let replacement = format!(r#""overrideId": "{room_uid}""#);
    OVERRIDE_ID
        .replace(definition, NoExpand(&replacement))
        .into_owned()
}

impl DashboardProvisioner {
    pub fn new(
        spec: DashboardSpec,
        definition: Result<String, String>,
        warehouse_id: Option<String>,
        query_room_uid: Option<String>,
    ) -> Self {
        Self {
            spec,
            definition,
            warehouse_id,
            query_room_uid,
        }
    }

    pub fn display_name(&self) -> String {
        self.spec.name.replace('/', "")
    }

    fn folder(&self, ctx: &InstallContext) -> String {
        format!("{}/{DASHBOARD_FOLDER}", ctx.settings.bundle_folder)
    }

    fn find(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        let name = self.display_name();
        let prefix = format!("{}/", self.folder(ctx));
        let found = ctx
            .client
            .pages("2.0/lakeview/dashboards", &[("page_size", "100")], "dashboards")
            .find_item(|d| {
                d.get("display_name").and_then(Value::as_str) == Some(name.as_str())
                    && d.get("path")
                        .and_then(Value::as_str)
                        .is_some_and(|p| p.starts_with(&prefix))
            })?;
        Ok(found.and_then(|d| id_of(&d, "dashboard_id")))
    }

    fn update(&self, ctx: &InstallContext, id: &str, body: &Value) -> Result<Provisioned, ProvisionError> {
        let response = ctx
            .client
            .patch(&format!("2.0/lakeview/dashboards/{id}"), body)?;
        if response.is_error() {
            return Err(rejected("could not update dashboard", body, response));
        }
        Ok(Provisioned::updated(id))
    }
}

impl Provisioner<InstallContext> for DashboardProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Dashboard
    }

    fn logical_id(&self) -> String {
        self.spec.id.clone()
    }

    fn description(&self) -> String {
        format!("Dashboard {}", self.spec.name)
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let Some(warehouse_id) = &self.warehouse_id else {
            return Err(ProvisionError::new("no SQL warehouse available for the dashboard"));
        };
        let mut serialized = self.definition.clone().map_err(ProvisionError::new)?;

        let mut warnings = Vec::new();
        match (&self.spec.genie_room_id, &self.query_room_uid) {
            (Some(_), Some(uid)) => serialized = inject_room(&serialized, uid),
            (Some(room), None) => {
                warnings.push(format!("query room '{room}' was not provisioned, assistant not linked"))
            }
            (None, _) => {}
        }

        let folder = self.folder(ctx);
        ctx.ensure_folder(&folder)?;

        let name = self.display_name();
        let mut body = json!({
            "display_name": name,
            "warehouse_id": warehouse_id,
            "serialized_dashboard": serialized,
        });

        let mut provisioned = match self.find(ctx)? {
            Some(id) => self.update(ctx, &id, &body)?,
            None => {
                body["parent_path"] = json!(folder);
                let response = ctx.client.post("2.0/lakeview/dashboards", &body)?;
                if response.is_conflict() {
                    let Some(id) = self.find(ctx)? else {
                        return Err(rejected("dashboard name conflict", &body, response));
                    };
                    self.update(ctx, &id, &body)?
                } else {
                    match response.id_field("dashboard_id").filter(|_| !response.is_error()) {
                        Some(id) => Provisioned::created(id),
                        None => return Err(rejected("could not create dashboard", &body, response)),
                    }
                }
            }
        };

        provisioned = provisioned.named(name);
        for warning in warnings {
            provisioned = provisioned.warn(warning);
        }
        Ok(provisioned)
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        self.find(ctx)
    }
}
