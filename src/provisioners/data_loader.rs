//! Bulk data loads: one table per data folder
//!
//! Sources are read with `read_files` from the bundle volume (relative
//! folders) or from any absolute location. A table that already exists is
//! left as is.

use provision::{ProvisionError, Provisioned, Provisioner, ResourceKind};

use crate::context::InstallContext;
use crate::descriptor::DataFolderSpec;
use crate::sql;

#[derive(Debug)]
pub struct DataLoadProvisioner {
    spec: DataFolderSpec,
    warehouse_id: Option<String>,
}

fn is_absolute(source: &str) -> bool {
    source.starts_with('/') || source.contains("://")
}

impl DataLoadProvisioner {
    pub fn new(spec: DataFolderSpec, warehouse_id: Option<String>) -> Self {
        Self { spec, warehouse_id }
    }

    fn full_name(&self, ctx: &InstallContext) -> String {
        format!(
            "{}.{}.{}",
            ctx.settings.catalog, ctx.settings.schema, self.spec.target_table_name
        )
    }

    fn exists(&self, ctx: &InstallContext) -> Result<bool, ProvisionError> {
        let response = ctx.client.get(
            &format!("2.1/unity-catalog/tables/{}", self.full_name(ctx)),
            &[],
        )?;
        if response.is_not_found() {
            return Ok(false);
        }
        Ok(!response.into_result()?.is_null())
    }

    pub fn statement(&self, ctx: &InstallContext, source: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} USING {} AS SELECT * FROM read_files('{}', format => '{}')",
            ctx.settings.qualified_table(&self.spec.target_table_name),
            self.spec.target_format,
            source.replace('\'', "\\'"),
            self.spec.source_format
        )
    }
}

impl Provisioner<InstallContext> for DataLoadProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DataLoad
    }

    fn logical_id(&self) -> String {
        self.spec.target_table_name.clone()
    }

    fn description(&self) -> String {
        format!("Table {} from {}", self.spec.target_table_name, self.spec.source_folder)
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let Some(warehouse_id) = &self.warehouse_id else {
            return Err(ProvisionError::new("no SQL warehouse available to load data"));
        };
        let full_name = self.full_name(ctx);
        if self.exists(ctx)? {
            return Ok(Provisioned::reused(full_name.clone()).named(full_name));
        }

        let source = if is_absolute(&self.spec.source_folder) {
            self.spec.source_folder.clone()
        } else {
            format!(
                "{}/{}",
                ctx.ensure_volume()?,
                self.spec.source_folder.trim_matches('/')
            )
        };
        log::info!("Loading {full_name} from {source}");
        sql::execute(
            &ctx.client,
            warehouse_id,
            &self.statement(ctx, &source),
            ctx.statement_poll(),
        )
        .map_err(|e| e.context(format!("could not load {full_name}")))?;

        Ok(Provisioned::created(full_name.clone())
            .named(full_name)
            .meta("source", source))
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        Ok(self.exists(ctx)?.then(|| self.full_name(ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorkspace, settings};
    use provision::Outcome;
    use serde_json::json;

    fn spec(source: &str) -> DataFolderSpec {
        DataFolderSpec {
            source_folder: source.to_string(),
            source_format: "csv".to_string(),
            target_table_name: "raw_orders".to_string(),
            target_format: "delta".to_string(),
        }
    }

    #[test]
    fn test_loads_from_volume_once() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());
        let provisioner = DataLoadProvisioner::new(spec("retail/orders/"), Some("wh-1".to_string()));

        let created = provisioner.provision(&ctx).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(created.uid.as_deref(), Some("main.retail.raw_orders"));
        assert_eq!(
            workspace.statements(),
            vec![
                "CREATE TABLE IF NOT EXISTS `main`.`retail`.`raw_orders` USING delta AS SELECT * FROM \
                 read_files('/Volumes/main/retail/lakebundle_raw_data/retail/orders', format => 'csv')"
                    .to_string()
            ]
        );

        let again = provisioner.provision(&ctx).unwrap();
        assert_eq!(again.outcome, Outcome::Reused);
        assert_eq!(workspace.statements().len(), 1);
    }

    #[test]
    fn test_absolute_source_skips_volume() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());
        DataLoadProvisioner::new(spec("s3://bucket/orders"), Some("wh-1".to_string()))
            .provision(&ctx)
            .unwrap();
        assert_eq!(workspace.count_calls("POST", "2.1/unity-catalog/volumes"), 0);
        assert!(workspace.statements()[0].contains("read_files('s3://bucket/orders'"));
    }

    #[test]
    fn test_volume_failure_fails_load() {
        let workspace = FakeWorkspace::new();
        workspace.fail("POST", "2.1/unity-catalog/volumes", 403, json!({ "error_code": "PERMISSION_DENIED", "message": "no" }));
        let ctx = workspace.context(settings());
        let err = DataLoadProvisioner::new(spec("orders"), Some("wh-1".to_string()))
            .provision(&ctx)
            .unwrap_err();
        assert!(err.message.contains("could not create volume"));
        assert!(workspace.statements().is_empty());
    }

    #[test]
    fn test_requires_warehouse() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());
        assert!(DataLoadProvisioner::new(spec("orders"), None).provision(&ctx).is_err());
    }
}
