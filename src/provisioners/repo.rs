//! Git repository mirrors
//!
//! The provisioned uid is the workspace path of the checkout, which is what
//! notebooks link to.

use provision::{ProvisionError, Provisioned, Provisioner, ResourceKind};
use serde_json::{Value, json};

use super::{id_of, rejected};
use crate::context::InstallContext;
use crate::descriptor::RepoSpec;

#[derive(Debug)]
pub struct RepoProvisioner {
    spec: RepoSpec,
}

impl RepoProvisioner {
    pub fn new(spec: RepoSpec) -> Self {
        Self { spec }
    }

    /// Workspace path; relative paths live in the bundle folder
    pub fn path(&self, ctx: &InstallContext) -> String {
        if self.spec.path.starts_with('/') {
            self.spec.path.trim_end_matches('/').to_string()
        } else {
            format!(
                "{}/{}",
                ctx.settings.bundle_folder,
                self.spec.path.trim_matches('/')
            )
        }
    }

    /// Check out the configured branch in an existing checkout
    fn update(&self, ctx: &InstallContext, path: &str, existing: &Value) -> Result<Provisioned, ProvisionError> {
        let id = id_of(existing, "id")
            .ok_or_else(|| ProvisionError::new(format!("repository at {path} has no id")))?;
        let body = json!({ "branch": self.spec.branch });
        let response = ctx.client.patch(&format!("2.0/repos/{id}"), &body)?;
        let mut provisioned = Provisioned::updated(path);
        if response.error_code() == Some("GIT_CONFLICT") {
            provisioned = Provisioned::reused(path).warn(format!(
                "repository {path} has local changes, branch {} not checked out",
                self.spec.branch
            ));
        } else if response.is_error() {
            return Err(rejected("could not update repository", &body, response));
        }
        Ok(provisioned.named(self.spec.url.clone()).meta("repo_id", id))
    }

    fn find(&self, ctx: &InstallContext, path: &str) -> Result<Option<Value>, ProvisionError> {
        Ok(ctx
            .client
            .pages("2.0/repos", &[("path_prefix", path)], "repos")
            .find_item(|repo| repo.get("path").and_then(Value::as_str) == Some(path))?)
    }
}

impl Provisioner<InstallContext> for RepoProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Repo
    }

    fn logical_id(&self) -> String {
        self.spec.id.clone()
    }

    fn description(&self) -> String {
        format!("Repository {}", self.spec.url)
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let path = self.path(ctx);

        if let Some(existing) = self.find(ctx, &path)? {
            return self.update(ctx, &path, &existing);
        }

        if let Some((parent, _)) = path.rsplit_once('/')
            && !parent.is_empty()
        {
            ctx.ensure_folder(parent)?;
        }
        let body = json!({
            "url": self.spec.url,
            "provider": self.spec.provider,
            "branch": self.spec.branch,
            "path": path,
        });
        let response = ctx.client.post("2.0/repos", &body)?;
        if response.is_conflict() {
            // Checked out meanwhile: reconcile the existing checkout once
            return match self.find(ctx, &path)? {
                Some(existing) => self.update(ctx, &path, &existing),
                None => Err(rejected("could not create repository", &body, response)),
            };
        }
        let Some(id) = response.id_field("id").filter(|_| !response.is_error()) else {
            return Err(rejected("could not create repository", &body, response));
        };
        Ok(Provisioned::created(path)
            .named(self.spec.url.clone())
            .meta("repo_id", id))
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        let path = self.path(ctx);
        Ok(self.find(ctx, &path)?.map(|_| path))
    }
}
