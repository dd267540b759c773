//! Manifests: ordered collections of resources to install
//!
//! Manifests arrive as already-rendered YAML (one or more `---` separated
//! documents). Decoding preserves document order, drops empty documents and
//! flattens `kind: List` wrappers in place.

use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::error::Error;
use crate::resource::{GroupVersionKind, ManagedResource};

/// File name of a provider's rendered components inside the artifacts tree
pub const COMPONENTS_FILE: &str = "components.yaml";

/// Ordered sequence of resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    resources: Vec<ManagedResource>,
}

impl Manifest {
    /// Manifest from already-decoded resources
    pub fn from_resources(resources: Vec<ManagedResource>) -> Self {
        Self { resources }
    }

    /// Decode multi-document YAML
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let docs = YamlLoader::load_from_str(input).map_err(|e| Error::Manifest {
            message: e.to_string(),
        })?;

        let mut resources = Vec::new();
        for doc in docs {
            let value = yaml_to_json(doc)?;
            push_document(&mut resources, value)?;
        }
        Ok(Self { resources })
    }

    /// Read and decode a manifest file
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Resources in manifest order
    pub fn iter(&self) -> impl Iterator<Item = &ManagedResource> {
        self.resources.iter()
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when the manifest holds no resources
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Append the resources of another manifest
    pub fn extend(&mut self, other: Manifest) {
        self.resources.extend(other.resources);
    }

    /// Copy keeping only resources for which `keep` returns true
    pub fn filter(&self, mut keep: impl FnMut(&ManagedResource) -> bool) -> Manifest {
        Manifest {
            resources: self.resources.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Copy without resources of the given kinds (matched on group and kind)
    pub fn without_kinds(&self, kinds: &[GroupVersionKind]) -> Manifest {
        self.filter(|r| {
            !kinds
                .iter()
                .any(|k| k.group == r.gvk.group && k.kind == r.gvk.kind)
        })
    }
}

impl IntoIterator for Manifest {
    type Item = ManagedResource;
    type IntoIter = std::vec::IntoIter<ManagedResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

/// Location of a provider's components inside an artifacts tree
///
/// Layout: `<artifacts>/repository/<provider_label>/<version>/components.yaml`
pub fn components_path(artifacts: &Path, provider_label: &str, version: &str) -> PathBuf {
    artifacts
        .join("repository")
        .join(provider_label)
        .join(version)
        .join(COMPONENTS_FILE)
}

fn push_document(resources: &mut Vec<ManagedResource>, value: Value) -> Result<(), Error> {
    if value.is_null() || value.as_object().is_some_and(Map::is_empty) {
        return Ok(());
    }

    let is_list = value.get("kind").and_then(Value::as_str) == Some("List");
    if is_list {
        if let Some(Value::Array(items)) = value.get("items") {
            for item in items {
                push_document(resources, item.clone())?;
            }
        }
        return Ok(());
    }

    resources.push(ManagedResource::from_value(value)?);
    Ok(())
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, Error> {
    let fail = |message: &str| Error::Manifest {
        message: message.to_string(),
    };
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s.parse().map_err(|_| fail(&format!("invalid number {}", s)))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match k {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    _ => return Err(fail("unsupported mapping key")),
                };
                map.insert(key, yaml_to_json(v)?);
            }
            Ok(Value::Object(map))
        }
        Yaml::Alias(_) => Err(fail("YAML aliases are not supported")),
        Yaml::BadValue => Err(fail("bad YAML value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{crd_kind, namespace_kind};

    const BMO_COMPONENTS: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: baremetal-operator-system
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: baremetalhosts.metal3.io
spec:
  group: metal3.io
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: baremetal-operator-controller-manager
  namespace: baremetal-operator-system
  labels:
    control-plane: controller-manager
spec:
  replicas: 1
---
"#;

    #[test]
    fn test_from_yaml_preserves_order_and_skips_empty() {
        let manifest = Manifest::from_yaml(BMO_COMPONENTS).unwrap();
        let kinds: Vec<_> = manifest.iter().map(|r| r.gvk.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Namespace", "CustomResourceDefinition", "Deployment"]);

        let deployment = manifest.iter().nth(2).unwrap();
        assert_eq!(deployment.namespace, "baremetal-operator-system");
        assert_eq!(deployment.labels["control-plane"], "controller-manager");
        assert_eq!(deployment.body["spec"]["replicas"], 1);
    }

    #[test]
    fn test_from_yaml_flattens_lists() {
        let yaml = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: ConfigMap
    metadata: {name: one, namespace: a}
  - apiVersion: v1
    kind: ConfigMap
    metadata: {name: two, namespace: a}
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        let names: Vec<_> = manifest.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_from_yaml_rejects_document_without_kind() {
        let err = Manifest::from_yaml("apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("missing kind"));
    }

    #[test]
    fn test_from_yaml_rejects_malformed_yaml() {
        let err = Manifest::from_yaml("kind: [unclosed\n").unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn test_without_kinds() {
        let manifest = Manifest::from_yaml(BMO_COMPONENTS).unwrap();
        let filtered = manifest.without_kinds(&[namespace_kind(), crd_kind()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.iter().next().unwrap().gvk.kind, "Deployment");
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn test_components_path_layout() {
        let path = components_path(Path::new("/var/metalctl"), "infrastructure-metal3", "v1.9.0");
        assert_eq!(
            path,
            PathBuf::from("/var/metalctl/repository/infrastructure-metal3/v1.9.0/components.yaml")
        );
    }

    #[tokio::test]
    async fn test_from_file_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.yaml");
        std::fs::write(&path, BMO_COMPONENTS).unwrap();
        let manifest = Manifest::from_file(&path).await.unwrap();
        assert_eq!(manifest.len(), 3);

        let missing = Manifest::from_file(&dir.path().join("missing.yaml")).await;
        assert!(matches!(missing, Err(Error::Io { .. })));
    }
}
