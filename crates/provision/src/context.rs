//! Progress and confirmation callbacks
//!
//! These traits keep the crate independent of any terminal UI.

use crate::types::{ProvisionResult, ResourceKind};
use anyhow::Result;

/// Progress callback for stage execution
pub trait ProgressCallback: Send {
    /// Called when a stage starts
    fn on_stage_start(&mut self, stage: &str, count: usize);

    /// Called when starting to provision a single resource
    fn on_resource_start(&mut self, kind: ResourceKind, id: &str, description: &str);

    /// Called when a resource completes
    fn on_resource_complete(&mut self, result: &ProvisionResult);

    /// Called when a stage completes
    fn on_stage_complete(&mut self, stage: &str);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_stage_start(&mut self, _stage: &str, _count: usize) {}
    fn on_resource_start(&mut self, _kind: ResourceKind, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _result: &ProvisionResult) {}
    fn on_stage_complete(&mut self, _stage: &str) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
