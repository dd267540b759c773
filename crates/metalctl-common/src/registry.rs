//! Kind registry
//!
//! Maps a [`GroupVersionKind`] to the API resource (plural, scope) needed to
//! address it. A registry is built once per process and shared by reference
//! with every [`KubeResourceClient`](crate::KubeResourceClient); there is no
//! global registration state.

use std::collections::HashMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::{info, warn};

use crate::error::Error;
use crate::resource::{GroupVersionKind, ManagedResource};

/// Bare metal host kind served by the bare metal operator
pub fn bare_metal_host_kind() -> GroupVersionKind {
    GroupVersionKind::new("metal3.io", "v1alpha1", "BareMetalHost")
}

/// Cluster API infrastructure machine backed by a bare metal host
pub fn metal3_machine_kind() -> GroupVersionKind {
    GroupVersionKind::new("infrastructure.cluster.x-k8s.io", "v1beta1", "Metal3Machine")
}

/// Core Node kind
pub fn node_kind() -> GroupVersionKind {
    GroupVersionKind::new("", "v1", "Node")
}

/// Core Namespace kind
pub fn namespace_kind() -> GroupVersionKind {
    GroupVersionKind::new("", "v1", "Namespace")
}

/// CustomResourceDefinition kind
pub fn crd_kind() -> GroupVersionKind {
    GroupVersionKind::new("apiextensions.k8s.io", "v1", "CustomResourceDefinition")
}

/// Whether a kind lives inside a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Namespaced
    Namespaced,
    /// Cluster-scoped
    Cluster,
}

/// Everything needed to address one kind
#[derive(Debug, Clone)]
pub struct KindInfo {
    /// kube-rs resource descriptor
    pub api_resource: ApiResource,
    /// Scope of the kind
    pub scope: Scope,
}

/// Explicit mapping from kind to its API resource
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    entries: HashMap<GroupVersionKind, KindInfo>,
}

impl KindRegistry {
    /// Registry with no entries; every lookup falls back to pluralisation
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the kinds metalctl installs and migrates
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_typed::<Namespace>(Scope::Cluster);
        registry.register_typed::<Node>(Scope::Cluster);
        registry.register_typed::<CustomResourceDefinition>(Scope::Cluster);
        registry.register_typed::<ClusterRole>(Scope::Cluster);
        registry.register_typed::<ClusterRoleBinding>(Scope::Cluster);
        registry.register_typed::<ServiceAccount>(Scope::Namespaced);
        registry.register_typed::<ConfigMap>(Scope::Namespaced);
        registry.register_typed::<Secret>(Scope::Namespaced);
        registry.register_typed::<Service>(Scope::Namespaced);
        registry.register_typed::<Deployment>(Scope::Namespaced);
        registry.register_typed::<Role>(Scope::Namespaced);
        registry.register_typed::<RoleBinding>(Scope::Namespaced);
        registry.register(bare_metal_host_kind(), Scope::Namespaced);
        registry.register(metal3_machine_kind(), Scope::Namespaced);
        registry
    }

    /// Standard registry extended with everything the API server advertises
    ///
    /// Falls back to [`KindRegistry::standard`] if discovery fails.
    pub async fn discover(client: Client) -> Self {
        let mut registry = Self::standard();
        match Discovery::new(client).run().await {
            Ok(discovery) => {
                for group in discovery.groups() {
                    for version in group.versions() {
                        for (ar, caps) in group.versioned_resources(version) {
                            let scope = match caps.scope {
                                kube::discovery::Scope::Cluster => Scope::Cluster,
                                kube::discovery::Scope::Namespaced => Scope::Namespaced,
                            };
                            let gvk = GroupVersionKind::new(&ar.group, &ar.version, &ar.kind);
                            registry.entries.insert(gvk, KindInfo { api_resource: ar, scope });
                        }
                    }
                }
                info!(kinds = registry.entries.len(), "Kind registry populated via API discovery");
            }
            Err(e) => {
                warn!(error = %e, "API discovery failed, using built-in kinds only");
            }
        }
        registry
    }

    /// Register a kind by its tag
    pub fn register(&mut self, gvk: GroupVersionKind, scope: Scope) {
        let api_resource = ApiResource {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            plural: pluralize_kind(&gvk.kind),
        };
        self.entries.insert(gvk, KindInfo { api_resource, scope });
    }

    fn register_typed<K>(&mut self, scope: Scope)
    where
        K: kube::Resource<DynamicType = ()>,
    {
        let api_resource = ApiResource::erase::<K>(&());
        let gvk = GroupVersionKind::new(&api_resource.group, &api_resource.version, &api_resource.kind);
        self.entries.insert(gvk, KindInfo { api_resource, scope });
    }

    /// Registered entry for a kind
    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&KindInfo> {
        self.entries.get(gvk)
    }

    /// Entry for a kind, synthesising one for unregistered kinds
    ///
    /// Unregistered kinds are treated as namespaced when addressed with a
    /// namespace and cluster-scoped otherwise.
    pub fn resolve(&self, gvk: &GroupVersionKind, namespace: &str) -> KindInfo {
        match self.entries.get(gvk) {
            Some(info) => info.clone(),
            None => KindInfo {
                api_resource: ApiResource {
                    group: gvk.group.clone(),
                    version: gvk.version.clone(),
                    api_version: gvk.api_version(),
                    kind: gvk.kind.clone(),
                    plural: pluralize_kind(&gvk.kind),
                },
                scope: if namespace.is_empty() {
                    Scope::Cluster
                } else {
                    Scope::Namespaced
                },
            },
        }
    }

    /// Check a document against its registered kind
    ///
    /// Rejects documents whose apiVersion/kind disagree with the registered
    /// entry, core-group documents naming a kind served by another group, and
    /// namespaced documents of cluster-scoped kinds.
    pub fn validate(&self, res: &ManagedResource) -> Result<(), Error> {
        let describe = res.key().to_string();
        if res.gvk.kind.is_empty() || res.gvk.version.is_empty() {
            return Err(Error::invalid(describe, "missing apiVersion or kind"));
        }
        let api_version = res.gvk.api_version();
        match self.entries.get(&res.gvk) {
            Some(info) => {
                if info.api_resource.api_version != api_version || info.api_resource.kind != res.gvk.kind {
                    return Err(Error::invalid(
                        describe,
                        format!(
                            "registered as {} {}, document says {} {}",
                            info.api_resource.api_version, info.api_resource.kind, api_version, res.gvk.kind
                        ),
                    ));
                }
                if info.scope == Scope::Cluster && !res.namespace.is_empty() {
                    return Err(Error::invalid(
                        describe,
                        format!("{} is cluster-scoped but has a namespace", res.gvk.kind),
                    ));
                }
            }
            // The core group never gains kinds, so an unknown core kind is a misspelt apiVersion
            None if res.gvk.group.is_empty() => {
                if let Some(served) = self
                    .entries
                    .values()
                    .find(|info| info.api_resource.kind == res.gvk.kind)
                {
                    return Err(Error::invalid(
                        describe,
                        format!(
                            "{} is served as {}, not {}",
                            res.gvk.kind, served.api_resource.api_version, api_version
                        ),
                    ));
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Kinds whose plural is not formed by the simple suffix rules
const KIND_PLURALS: &[(&str, &str)] = &[("endpoints", "endpoints"), ("ingress", "ingresses")];

/// Lower-case plural resource name of a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_knows_migrated_kinds() {
        let registry = KindRegistry::standard();

        let host = registry.get(&bare_metal_host_kind()).unwrap();
        assert_eq!(host.api_resource.plural, "baremetalhosts");
        assert_eq!(host.scope, Scope::Namespaced);

        let machine = registry.get(&metal3_machine_kind()).unwrap();
        assert_eq!(machine.api_resource.plural, "metal3machines");
        assert_eq!(machine.api_resource.api_version, "infrastructure.cluster.x-k8s.io/v1beta1");

        let node = registry.get(&node_kind()).unwrap();
        assert_eq!(node.api_resource.plural, "nodes");
        assert_eq!(node.scope, Scope::Cluster);

        let crd = registry.get(&crd_kind()).unwrap();
        assert_eq!(crd.api_resource.plural, "customresourcedefinitions");
        assert_eq!(crd.scope, Scope::Cluster);
    }

    #[test]
    fn test_resolve_unregistered_kind_infers_scope() {
        let registry = KindRegistry::empty();
        let gvk = GroupVersionKind::new("example.io", "v1", "Policy");

        let namespaced = registry.resolve(&gvk, "a");
        assert_eq!(namespaced.scope, Scope::Namespaced);
        assert_eq!(namespaced.api_resource.plural, "policies");

        assert_eq!(registry.resolve(&gvk, "").scope, Scope::Cluster);
    }

    #[test]
    fn test_validate_rejects_namespaced_cluster_kind() {
        let registry = KindRegistry::standard();
        let node = ManagedResource::new(node_kind(), "a", "worker-0");
        assert!(registry.validate(&node).is_err());

        let host = ManagedResource::new(bare_metal_host_kind(), "a", "h1");
        assert!(registry.validate(&host).is_ok());
    }

    #[test]
    fn test_validate_rejects_kind_under_wrong_api_version() {
        let registry = KindRegistry::standard();
        let deployment = ManagedResource::new(GroupVersionKind::new("", "v1", "Deployment"), "a", "ironic");
        let err = registry.validate(&deployment).unwrap_err();
        assert!(err.to_string().contains("served as apps/v1"));

        let fine = ManagedResource::new(GroupVersionKind::new("apps", "v1", "Deployment"), "a", "ironic");
        assert!(registry.validate(&fine).is_ok());
    }

    #[test]
    fn test_validate_rejects_entry_disagreeing_with_document() {
        let mut registry = KindRegistry::empty();
        let gvk = GroupVersionKind::new("example.io", "v1", "Widget");
        registry.entries.insert(
            gvk.clone(),
            KindInfo {
                api_resource: ApiResource {
                    group: "example.io".to_string(),
                    version: "v2".to_string(),
                    api_version: "example.io/v2".to_string(),
                    kind: "Widget".to_string(),
                    plural: "widgets".to_string(),
                },
                scope: Scope::Namespaced,
            },
        );
        let err = registry.validate(&ManagedResource::new(gvk, "a", "w")).unwrap_err();
        assert!(err.to_string().contains("registered as example.io/v2 Widget"));
    }

    #[test]
    fn test_validate_allows_unknown_custom_kinds() {
        let registry = KindRegistry::standard();
        let policy = ManagedResource::new(GroupVersionKind::new("example.io", "v1", "Policy"), "a", "p");
        assert!(registry.validate(&policy).is_ok());
    }

    #[test]
    fn test_pluralize_kind() {
        assert_eq!(pluralize_kind("BareMetalHost"), "baremetalhosts");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("NetworkPolicy"), "networkpolicies");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
        assert_eq!(pluralize_kind("Endpoints"), "endpoints");
    }
}
