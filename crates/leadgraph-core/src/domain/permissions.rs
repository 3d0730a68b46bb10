//! Permission sets
//!
//! A [`PermissionSet`] is an ordered set of capability names. The same type
//! models account-level OAuth scopes and page-level tasks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::graph_objects::{PermissionEntry, PermissionStatus};

/// Page task required to read lead submissions
pub const ACCESS_LEAD_GEN: &str = "ACCESS_LEAD_GEN";

/// A set of capability names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the granted-scope set from `me/permissions` entries.
    ///
    /// Only entries whose status is `granted` are kept.
    pub fn granted_from(entries: &[PermissionEntry]) -> Self {
        entries
            .iter()
            .filter(|e| e.status == PermissionStatus::Granted)
            .map(|e| e.permission.clone())
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Capabilities in `required` that this set does not contain.
    pub fn missing(&self, required: &PermissionSet) -> PermissionSet {
        PermissionSet(required.0.difference(&self.0).cloned().collect())
    }

    /// Whether this set is a superset of `required`.
    pub fn satisfies(&self, required: &PermissionSet) -> bool {
        self.0.is_superset(&required.0)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{}", names.join(", "))
    }
}
