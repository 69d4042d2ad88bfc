//! One provisioner per resource kind
//!
//! Each provisioner is find-or-create-or-update against the workspace API:
//! look the resource up by its natural key (following pagination), create it
//! when missing, reconcile it otherwise. Failures are returned as
//! [`ProvisionError`] and turned into failed results by the stage executor.

pub mod cluster;
pub mod dashboard;
pub mod data_loader;
pub mod pipeline;
pub mod query_room;
pub mod repo;
pub mod warehouse;
pub mod workflow;

pub use cluster::ClusterProvisioner;
pub use dashboard::DashboardProvisioner;
pub use data_loader::DataLoadProvisioner;
pub use pipeline::PipelineProvisioner;
pub use query_room::QueryRoomProvisioner;
pub use repo::RepoProvisioner;
pub use warehouse::WarehouseProvisioner;
pub use workflow::WorkflowProvisioner;

use provision::ProvisionError;
use serde_json::Value;
use wsclient::{ApiResponse, WorkspaceClient};

/// Error for a rejected call, keeping what was sent and what came back
pub(crate) fn rejected(what: &str, definition: &Value, response: ApiResponse) -> ProvisionError {
    let detail = match (response.error_code(), response.message()) {
        (Some(code), message) if message != code && !message.is_empty() => {
            format!("{code}: {message}")
        }
        (Some(code), _) => code.to_string(),
        (None, message) if !message.is_empty() => message,
        (None, _) => format!("HTTP {}", response.status),
    };
    ProvisionError::new(format!("{what}: {detail}"))
        .with_definition(definition.clone())
        .with_response(response.body)
}

/// First item of a paginated list whose `field` equals `value`
pub(crate) fn find_by(
    client: &WorkspaceClient,
    path: &str,
    query: &[(&str, &str)],
    items_key: &str,
    field: &str,
    value: &str,
) -> Result<Option<Value>, ProvisionError> {
    let pointer = format!("/{}", field.replace('.', "/"));
    Ok(client
        .pages(path, query, items_key)
        .find_item(|item| item.pointer(&pointer).and_then(Value::as_str) == Some(value))?)
}

/// A string or numeric id field
pub(crate) fn id_of(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
