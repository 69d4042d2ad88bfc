//! Provisioner trait
//!
//! A Provisioner converges one resource spec onto the workspace: find it by
//! its natural key, reconcile, then create or update it.

use crate::error::ProvisionError;
use crate::types::{Provisioned, ResourceKind};
use std::fmt;

/// Core trait for workspace resources
///
/// Provisioners are stateless: everything they know comes from the spec they
/// were built from and the shared context `C` passed to each call. Errors
/// returned here are recorded on the resource's result and never abort the
/// installation.
///
/// # Example
///
/// ```ignore
/// use provision::{Provisioner, Provisioned, ProvisionError, ResourceKind};
///
/// #[derive(Debug)]
/// struct Folder { path: String }
///
/// impl Provisioner<Ctx> for Folder {
///     fn kind(&self) -> ResourceKind { ResourceKind::Repo }
///     fn logical_id(&self) -> String { self.path.clone() }
///     fn description(&self) -> String { format!("Folder {}", self.path) }
///
///     fn provision(&self, ctx: &Ctx) -> Result<Provisioned, ProvisionError> {
///         ctx.client.post("2.0/workspace/mkdirs", &json!({"path": self.path}))?;
///         Ok(Provisioned::created(&self.path))
///     }
/// }
/// ```
pub trait Provisioner<C: ?Sized>: Send + Sync + fmt::Debug {
    /// Kind of resource this spec provisions
    fn kind(&self) -> ResourceKind;

    /// Logical identifier, unique within the kind
    fn logical_id(&self) -> String;

    /// Human-readable description
    fn description(&self) -> String;

    /// Find, reconcile and create or update the resource
    fn provision(&self, ctx: &C) -> Result<Provisioned, ProvisionError>;

    /// Look the resource up without modifying anything
    ///
    /// Used for filtered-out specs and dry runs so that dependents can still
    /// resolve ids. Returns the provisioned uid when the resource exists.
    fn lookup(&self, _ctx: &C) -> Result<Option<String>, ProvisionError> {
        Ok(None)
    }
}

/// A boxed provisioner for type-erased storage
pub type BoxedProvisioner<C> = Box<dyn Provisioner<C>>;
