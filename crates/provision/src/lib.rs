//! # Provision
//!
//! Idempotent provisioning of workspace resources.
//!
//! ## Core Concepts
//!
//! - **Provisioner**: find-or-create-or-update for one resource spec
//! - **ProvisionResult**: `{logical_id, provisioned_uid, error}`, produced
//!   exactly once per spec, failures included
//! - **Stage**: provisioners without dependencies on each other
//! - **execute_stage**: runs a stage on a bounded rayon pool; errors and
//!   panics become failed results, the stage always joins fully
//! - **merge**: deterministic JSON definition merge with explicit
//!   overwrite and preserved keys
//! - **poll_until**: bounded fixed-interval polling
//!
//! ## Example
//!
//! ```ignore
//! use provision::{execute_stage, ExecuteOptions, NoProgress, Stage};
//!
//! let mut stage = Stage::new("compute");
//! stage.push(Box::new(ClusterProvisioner::new(spec)));
//! stage.push(Box::new(WarehouseProvisioner::new(None)));
//!
//! let results = execute_stage(&stage, &ctx, &ExecuteOptions::default(), &mut NoProgress)?;
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod merge;
pub mod poll;
pub mod provisioner;
pub mod stage;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use error::ProvisionError;
pub use executor::execute_stage;
pub use merge::{MergePolicy, RUNTIME_ASSIGNED, merge, merged};
pub use poll::{PollConfig, PollOutcome, PollStatus, poll_until};
pub use provisioner::{BoxedProvisioner, Provisioner};
pub use stage::Stage;
pub use types::{
    ExecuteOptions, Failure, Outcome, ProvisionResult, Provisioned, ResourceKind, StageSummary,
};
