//! Stages - groups of provisioners that run together

use crate::provisioner::{BoxedProvisioner, Provisioner};
use crate::types::ResourceKind;

/// A set of independent provisioners executed on one worker pool
///
/// Specs outside a target filter are not dropped: they move to
/// `lookup_only` so their existing ids stay available to later stages.
pub struct Stage<C: ?Sized> {
    pub name: String,
    /// Provisioners to run
    pub active: Vec<BoxedProvisioner<C>>,
    /// Provisioners that are only looked up
    pub lookup_only: Vec<BoxedProvisioner<C>>,
}

impl<C: ?Sized> Stage<C> {
    /// Create a new empty stage
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: Vec::new(),
            lookup_only: Vec::new(),
        }
    }

    pub fn push(&mut self, provisioner: BoxedProvisioner<C>) {
        self.active.push(provisioner);
    }

    /// Keep only provisioners matching a predicate active
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Provisioner<C>) -> bool,
    {
        let (active, filtered): (Vec<_>, Vec<_>) = self
            .active
            .into_iter()
            .partition(|p| predicate(p.as_ref()));
        let mut lookup_only = self.lookup_only;
        lookup_only.extend(filtered);
        Self {
            name: self.name,
            active,
            lookup_only,
        }
    }

    /// Keep only provisioners matching a target pattern active
    ///
    /// Target format: "kind" or "kind.logical_id"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|p| matches_filter(p, kind.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of provisioners in the stage
    pub fn total(&self) -> usize {
        self.active.len() + self.lookup_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.lookup_only.is_empty()
    }
}

/// Parse a target string like "kind.id" into (kind, id)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((kind, id)) if !kind.is_empty() => (Some(kind.to_string()), Some(id.to_string())),
        Some(_) => (None, Some(target.trim_start_matches('.').to_string())),
    }
}

/// Check if a provisioner matches the filter criteria
fn matches_filter<C: ?Sized>(
    provisioner: &dyn Provisioner<C>,
    kind: Option<&str>,
    id: Option<&str>,
) -> bool {
    if let Some(k) = kind {
        match k.parse::<ResourceKind>() {
            Ok(kind) if kind == provisioner.kind() => {}
            _ => return false,
        }
    }

    if let Some(id) = id
        && provisioner.logical_id() != id
    {
        return false;
    }

    true
}
