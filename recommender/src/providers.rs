//! Cloud-provider knowledge: API-group detection and foundational resources.

use crate::types::{ResourceTypeRef, compare_api_versions};
use std::collections::BTreeSet;

/// Resource every other type of a provider lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Foundational {
    pub kind: &'static str,
    /// Version used when the catalog has no matching type
    pub default_version: &'static str,
}

/// One known cloud provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    /// Provider tag stored on capability records
    pub name: &'static str,
    /// API-group labels that identify the provider
    pub group_labels: &'static [&'static str],
    /// Lowercased field names that only make sense for this provider
    pub field_hints: &'static [&'static str],
    pub foundational: Option<Foundational>,
}

pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "azure",
        group_labels: &["azure"],
        field_hints: &["resourcegroupname", "resourcegroupnameref", "subscriptionid", "tenantid"],
        foundational: Some(Foundational {
            kind: "ResourceGroup",
            default_version: "v1beta1",
        }),
    },
    ProviderSpec {
        name: "aws",
        group_labels: &["aws"],
        field_hints: &["arn", "awsaccountid", "kmskeyid"],
        foundational: None,
    },
    ProviderSpec {
        name: "gcp",
        group_labels: &["gcp", "google"],
        field_hints: &["gcpproject", "projectid"],
        foundational: None,
    },
    ProviderSpec {
        name: "alibaba",
        group_labels: &["alibaba", "alicloud"],
        field_hints: &[],
        foundational: None,
    },
    ProviderSpec {
        name: "ibm",
        group_labels: &["ibm", "ibmcloud"],
        field_hints: &[],
        foundational: None,
    },
    ProviderSpec {
        name: "digitalocean",
        group_labels: &["digitalocean", "do"],
        field_hints: &[],
        foundational: None,
    },
];

/// Provider owning an API group, if any
pub fn provider_for_group(group: &str) -> Option<&'static ProviderSpec> {
    group.split('.').find_map(|label| {
        PROVIDERS
            .iter()
            .find(|p| p.group_labels.contains(&label))
    })
}

/// Provider tags implied by the API group
pub fn providers_in_group(group: &str) -> BTreeSet<String> {
    provider_for_group(group)
        .map(|p| p.name.to_string())
        .into_iter()
        .collect()
}

/// Provider tags implied by a field name (case-insensitive)
pub fn providers_for_field(field_name: &str) -> impl Iterator<Item = &'static str> {
    let lower = field_name.to_ascii_lowercase();
    PROVIDERS
        .iter()
        .filter(move |p| p.field_hints.contains(&lower.as_str()))
        .map(|p| p.name)
}

/// Group suffix starting at the provider label.
///
/// `dbforpostgresql.azure.upbound.io` → `azure.upbound.io`,
/// `dbforpostgresql.azure` → `azure`.
pub fn provider_root_group(group: &str, provider: &ProviderSpec) -> Option<String> {
    let labels: Vec<&str> = group.split('.').collect();
    let idx = labels
        .iter()
        .position(|l| provider.group_labels.contains(l))?;
    Some(labels[idx..].join("."))
}

/// Groups considered related to `group` when resolving references:
/// the group itself, then its provider root.
pub fn related_groups(group: &str) -> Vec<String> {
    let mut groups = vec![group.to_string()];
    if let Some(provider) = provider_for_group(group)
        && let Some(root) = provider_root_group(group, provider)
        && root != group
    {
        groups.push(root);
    }
    groups
}

/// Foundational resource `resource` must live in, if its provider has one.
///
/// The version comes from the catalog when a type with the same kind and
/// group is known, otherwise from the provider default. Returns `None` for the
/// foundational resource itself.
pub fn foundational_for(
    resource: &ResourceTypeRef,
    known_types: &[ResourceTypeRef],
) -> Option<ResourceTypeRef> {
    let provider = provider_for_group(&resource.group)?;
    let foundational = provider.foundational?;
    let root = provider_root_group(&resource.group, provider)?;

    if resource.kind == foundational.kind && resource.group == root {
        return None;
    }

    let version = known_types
        .iter()
        .filter(|t| t.kind == foundational.kind && t.group == root)
        .map(|t| t.version.as_str())
        .max_by(|a, b| compare_api_versions(a, b))
        .unwrap_or(foundational.default_version);

    Some(ResourceTypeRef::new(foundational.kind, root, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_provider_from_group() {
        assert_eq!(
            providers_in_group("dbforpostgresql.azure.upbound.io"),
            BTreeSet::from(["azure".to_string()])
        );
        assert_eq!(provider_for_group("ec2.aws.upbound.io").map(|p| p.name), Some("aws"));
        assert_eq!(
            provider_for_group("sql.cnrm.cloud.google.com").map(|p| p.name),
            Some("gcp")
        );
        assert!(provider_for_group("apps").is_none());
        assert!(provider_for_group("").is_none());
    }

    #[test]
    fn test_provider_root_group() {
        let azure = provider_for_group("azure").expect("azure known");
        assert_eq!(
            provider_root_group("dbforpostgresql.azure", azure).as_deref(),
            Some("azure")
        );
        assert_eq!(
            provider_root_group("network.azure.upbound.io", azure).as_deref(),
            Some("azure.upbound.io")
        );
    }

    #[test]
    fn test_foundational_uses_catalog_version() {
        let server = ResourceTypeRef::new("Server", "dbforpostgresql.azure", "v1beta1");
        let known = vec![ResourceTypeRef::new("ResourceGroup", "azure", "v1beta2")];
        assert_eq!(
            foundational_for(&server, &known),
            Some(ResourceTypeRef::new("ResourceGroup", "azure", "v1beta2"))
        );
        assert_eq!(
            foundational_for(&server, &[]),
            Some(ResourceTypeRef::new("ResourceGroup", "azure", "v1beta1"))
        );
    }

    #[test]
    fn test_foundational_prefers_ga_version() {
        let server = ResourceTypeRef::new("Server", "dbforpostgresql.azure", "v1beta1");
        let known = vec![
            ResourceTypeRef::new("ResourceGroup", "azure", "v1beta1"),
            ResourceTypeRef::new("ResourceGroup", "azure", "v1"),
        ];
        assert_eq!(
            foundational_for(&server, &known).map(|r| r.version),
            Some("v1".to_string())
        );
    }

    #[test]
    fn test_foundational_excludes_itself_and_unfounded_providers() {
        let rg = ResourceTypeRef::new("ResourceGroup", "azure", "v1beta1");
        assert!(foundational_for(&rg, &[]).is_none());

        let bucket = ResourceTypeRef::new("Bucket", "s3.aws.upbound.io", "v1beta1");
        assert!(foundational_for(&bucket, &[]).is_none());

        let deployment = ResourceTypeRef::new("Deployment", "apps", "v1");
        assert!(foundational_for(&deployment, &[]).is_none());
    }

    #[test]
    fn test_field_hints() {
        let hits: Vec<_> = providers_for_field("resourceGroupName").collect();
        assert_eq!(hits, vec!["azure"]);
        assert_eq!(providers_for_field("location").count(), 0);
    }

    #[test]
    fn test_related_groups() {
        assert_eq!(
            related_groups("dbforpostgresql.azure.upbound.io"),
            vec!["dbforpostgresql.azure.upbound.io".to_string(), "azure.upbound.io".to_string()]
        );
        assert_eq!(related_groups("apps"), vec!["apps".to_string()]);
    }
}
