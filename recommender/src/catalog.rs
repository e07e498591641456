//! Live catalog of resource types installed in the cluster
//!
//! The resolver asks the catalog whether a dependency target can actually be
//! created. Matching ignores the version: an edge recorded against `v1beta1`
//! is still satisfied by a cluster that serves `v1beta2`.

use crate::types::{ResourceTypeRef, compare_api_versions};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable set of known resource types, indexed by `(kind, group)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCatalog {
    /// `(lowercased kind, group)` -> served versions
    by_kind_group: BTreeMap<(String, String), BTreeSet<String>>,
    types: BTreeSet<ResourceTypeRef>,
}

impl TypeCatalog {
    pub fn new(types: impl IntoIterator<Item = ResourceTypeRef>) -> Self {
        let mut catalog = Self::default();
        for t in types {
            catalog
                .by_kind_group
                .entry((t.kind.to_ascii_lowercase(), t.group.clone()))
                .or_default()
                .insert(t.version.clone());
            catalog.types.insert(t);
        }
        catalog
    }

    /// Whether some version of `resource`'s kind and group is served
    pub fn contains(&self, resource: &ResourceTypeRef) -> bool {
        self.by_kind_group
            .contains_key(&(resource.kind.to_ascii_lowercase(), resource.group.clone()))
    }

    /// Catalog entry for `resource`: the exact version if served, else the
    /// served version of the same kind and group with the highest API priority
    pub fn resolve(&self, resource: &ResourceTypeRef) -> Option<ResourceTypeRef> {
        if self.types.contains(resource) {
            return Some(resource.clone());
        }
        let versions = self
            .by_kind_group
            .get(&(resource.kind.to_ascii_lowercase(), resource.group.clone()))?;
        let version = versions
            .iter()
            .max_by(|a, b| compare_api_versions(a, b))?;
        self.types
            .iter()
            .find(|t| t.same_kind_and_group(resource) && &t.version == version)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceTypeRef> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<ResourceTypeRef> for TypeCatalog {
    fn from_iter<I: IntoIterator<Item = ResourceTypeRef>>(iter: I) -> Self {
        Self::new(iter)
    }
}
