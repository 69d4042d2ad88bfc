//! Per-installation context shared by all provisioners
//!
//! Provisioners are stateless; everything they share lives here. The only
//! mutable state is guarded by mutexes: the set of folders already created
//! and the bundle volume, which is created at most once.

use provision::{PollConfig, ProvisionError};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use wsclient::WorkspaceClient;

use crate::config::{Cloud, PollSettings};

/// Name of the managed volume holding bundle data files
pub const BUNDLE_VOLUME: &str = "lakebundle_raw_data";

/// Resolved settings of one installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    pub bundle: String,
    /// Folder the bundle folder is created in
    pub install_path: String,
    /// `<install_path>/<bundle>`
    pub bundle_folder: String,
    pub catalog: String,
    pub schema: String,
    pub username: String,
    pub cloud: Cloud,
    pub serverless: bool,
    /// Warehouse requested by the user
    pub warehouse_name: Option<String>,
    pub fallback_cluster_id: Option<String>,
    /// Skip the bundle cluster and use `fallback_cluster_id`
    pub use_current_cluster: bool,
    pub update_cluster_if_exists: bool,
    pub start_cluster: bool,
    pub instance_pool_id: Option<String>,
    pub pipeline_policy_id: Option<String>,
    pub poll: PollSettings,
    /// `%Y-%m-%d`
    pub today: String,
}

impl InstallSettings {
    /// Local part of the username, as used in resource names
    pub fn user_name(&self) -> String {
        let local = self
            .username
            .split('@')
            .next()
            .unwrap_or(self.username.as_str());
        local
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn qualified_table(&self, table: &str) -> String {
        format!("`{}`.`{}`.`{}`", self.catalog, self.schema, table)
    }
}

pub struct InstallContext {
    pub client: WorkspaceClient,
    pub settings: InstallSettings,
    folders: Mutex<BTreeSet<String>>,
    volume: Mutex<Option<Result<String, ProvisionError>>>,
}

impl std::fmt::Debug for InstallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallContext")
            .field("bundle", &self.settings.bundle)
            .field("bundle_folder", &self.settings.bundle_folder)
            .finish_non_exhaustive()
    }
}

impl InstallContext {
    pub fn new(client: WorkspaceClient, settings: InstallSettings) -> Self {
        Self {
            client,
            settings,
            folders: Mutex::new(BTreeSet::new()),
            volume: Mutex::new(None),
        }
    }

    pub fn poll(&self) -> &PollSettings {
        &self.settings.poll
    }

    pub fn statement_poll(&self) -> &PollConfig {
        &self.settings.poll.statement
    }

    /// Create a workspace folder (and its parents) once per installation.
    ///
    /// The lock is held across the call: concurrent `mkdirs` on overlapping
    /// paths fail on the workspace side.
    pub fn ensure_folder(&self, path: &str) -> Result<(), ProvisionError> {
        let mut folders = self.folders.lock().unwrap_or_else(PoisonError::into_inner);
        if folders.contains(path) {
            return Ok(());
        }
        let response = self
            .client
            .post("2.0/workspace/mkdirs", &json!({ "path": path }))?;
        if response.is_error() && !response.is_conflict() {
            return Err(ProvisionError::new(format!(
                "could not create folder {path}: {}",
                response.message()
            ))
            .with_response(response.body));
        }
        folders.insert(path.to_string());
        Ok(())
    }

    /// Forget folders, after the install folder was deleted
    pub fn reset_folders(&self) {
        self.folders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Ensure the managed volume holding bundle data exists and return its
    /// `/Volumes/...` path. Only the first caller talks to the workspace;
    /// later callers get the same answer, failures included.
    pub fn ensure_volume(&self) -> Result<String, ProvisionError> {
        let mut volume = self.volume.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(done) = volume.as_ref() {
            return done.clone();
        }
        let result = self.create_volume();
        *volume = Some(result.clone());
        result
    }

    fn create_volume(&self) -> Result<String, ProvisionError> {
        let settings = &self.settings;
        let response = self.client.post(
            "2.1/unity-catalog/volumes",
            &json!({
                "catalog_name": settings.catalog,
                "schema_name": settings.schema,
                "name": BUNDLE_VOLUME,
                "volume_type": "MANAGED",
            }),
        )?;
        if response.is_error() && !response.is_conflict() {
            return Err(ProvisionError::new(format!(
                "could not create volume {}.{}.{BUNDLE_VOLUME}: {}",
                settings.catalog,
                settings.schema,
                response.message()
            ))
            .with_response(response.body));
        }
        Ok(format!(
            "/Volumes/{}/{}/{BUNDLE_VOLUME}",
            settings.catalog, settings.schema
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorkspace, settings};
    use std::sync::Arc;

    #[test]
    fn test_user_name() {
        let mut s = settings();
        s.username = "jane.doe@example.com".to_string();
        assert_eq!(s.user_name(), "jane_doe");
        assert_eq!(s.qualified_table("sales"), "`main`.`retail`.`sales`");
    }

    #[test]
    fn test_ensure_folder_once() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());
        ctx.ensure_folder("/Users/jane/a").unwrap();
        ctx.ensure_folder("/Users/jane/a").unwrap();
        assert_eq!(workspace.count_calls("POST", "2.0/workspace/mkdirs"), 1);
    }

    #[test]
    fn test_ensure_folder_concurrently() {
        let workspace = FakeWorkspace::new();
        let ctx = Arc::new(workspace.context(settings()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || ctx.ensure_folder("/Users/jane/shared").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(workspace.count_calls("POST", "2.0/workspace/mkdirs"), 1);
    }

    #[test]
    fn test_ensure_volume_once() {
        let workspace = FakeWorkspace::new();
        let ctx = workspace.context(settings());
        let first = ctx.ensure_volume().unwrap();
        let second = ctx.ensure_volume().unwrap();
        assert_eq!(first, "/Volumes/main/retail/lakebundle_raw_data");
        assert_eq!(first, second);
        assert_eq!(workspace.count_calls("POST", "2.1/unity-catalog/volumes"), 1);
    }
}
