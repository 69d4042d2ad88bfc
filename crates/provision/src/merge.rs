//! Deterministic merge of JSON definitions
//!
//! Objects merge recursively. For any other value the overlay wins only
//! when the policy says so, and never for a preserved key the base already
//! holds.

use serde_json::Value;
use std::collections::BTreeSet;

/// Keys describing runtime-assigned placement that descriptor defaults must
/// not clobber: pool assignment, environment and tags.
pub const RUNTIME_ASSIGNED: [&str; 5] = [
    "instance_pool_id",
    "driver_instance_pool_id",
    "policy_id",
    "spark_env_vars",
    "custom_tags",
];

/// How overlay values interact with base values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePolicy {
    overwrite: bool,
    preserved: BTreeSet<String>,
}

impl MergePolicy {
    /// Overlay scalars and lists replace base ones
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            preserved: BTreeSet::new(),
        }
    }

    /// Overlay only fills keys the base does not have
    pub fn keep_existing() -> Self {
        Self::default()
    }

    /// Never replace these keys (at any depth) when the base already has them
    pub fn preserving<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserved.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn overwrites(&self) -> bool {
        self.overwrite
    }

    pub fn is_preserved(&self, key: &str) -> bool {
        self.preserved.contains(key)
    }
}

/// Merge `overlay` into `base` in place
pub fn merge(base: &mut Value, overlay: &Value, policy: &MergePolicy) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                    Some(_) if policy.is_preserved(key) => {}
                    Some(existing) => merge(existing, value, policy),
                }
            }
        }
        (base, overlay) => {
            if policy.overwrite {
                *base = overlay.clone();
            }
        }
    }
}

/// Merge into a copy of `base`
pub fn merged(base: &Value, overlay: &Value, policy: &MergePolicy) -> Value {
    let mut out = base.clone();
    merge(&mut out, overlay, policy);
    out
}
