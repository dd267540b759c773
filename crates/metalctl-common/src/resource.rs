//! Managed resource model
//!
//! [`ManagedResource`] is a tagged document: a [`GroupVersionKind`] tag, the
//! metadata the core reasons about (identity, concurrency token, labels,
//! annotations), and the remaining top-level fields as generic JSON. Metadata
//! fields the core does not model are carried through untouched so that a
//! read-modify-write cycle never drops them.

use std::collections::BTreeMap;
use std::fmt;

use kube::api::DynamicObject;
use serde_json::{Map, Value};

use crate::error::Error;

/// Annotation the bare metal operator honors to stop reconciling a host
pub const PAUSED_ANNOTATION: &str = "baremetalhost.metal3.io/paused";

/// Value written under [`PAUSED_ANNOTATION`]
pub const PAUSED_VALUE: &str = "true";

/// Field on `status` stamped whenever a status document is copied
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// Metadata assigned by a store that must not be carried to another store
const TRANSIENT_METADATA: &[&str] = &[
    "creationTimestamp",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
    "generation",
    "managedFields",
    "ownerReferences",
    "selfLink",
];

/// Kind tag of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionKind {
    /// API group, empty for the core group
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Kind name
    pub kind: String,
}

impl GroupVersionKind {
    /// Build a kind tag
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build a kind tag from an `apiVersion` string such as `metal3.io/v1alpha1` or `v1`
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.into(),
        }
    }

    /// The `apiVersion` string for this kind
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.api_version())
    }
}

/// Identity of a resource within one store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    /// Kind tag
    pub gvk: GroupVersionKind,
    /// Namespace, empty for cluster-scoped resources
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ResourceKey {
    /// Build a key
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.gvk.kind)?;
        if !self.namespace.is_empty() {
            write!(f, "/{}", self.namespace)?;
        }
        if !self.name.is_empty() {
            write!(f, "/{}", self.name)?;
        }
        Ok(())
    }
}

/// A resource document as read from or written to a store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManagedResource {
    /// Kind tag
    pub gvk: GroupVersionKind,
    /// Namespace, empty for cluster-scoped resources
    pub namespace: String,
    /// Object name
    pub name: String,
    /// Store-assigned unique id, never supplied on create
    pub uid: Option<String>,
    /// Store-assigned concurrency token, must be empty on create
    pub resource_version: Option<String>,
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations
    pub annotations: BTreeMap<String, String>,
    /// Metadata fields not modelled above (finalizers, ownerReferences, ...)
    pub extra_metadata: Map<String, Value>,
    /// Top-level fields other than apiVersion, kind, metadata and status
    pub body: Map<String, Value>,
    /// Status sub-document
    pub status: Option<Value>,
}

impl Default for GroupVersionKind {
    fn default() -> Self {
        Self::new("", "v1", "")
    }
}

impl ManagedResource {
    /// Start an empty resource of the given kind
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Identity key of this resource
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.gvk.clone(), self.namespace.clone(), self.name.clone())
    }

    /// Decode a full JSON document
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut doc) = value else {
            return Err(Error::invalid("<unknown>", "document is not an object"));
        };

        let api_version = take_string(&mut doc, "apiVersion")
            .ok_or_else(|| Error::invalid("<unknown>", "missing apiVersion"))?;
        let kind = take_string(&mut doc, "kind")
            .ok_or_else(|| Error::invalid("<unknown>", "missing kind"))?;
        let gvk = GroupVersionKind::from_api_version(&api_version, kind);
        Self::from_parts(gvk, doc)
    }

    /// Decode a document whose kind is known from context (list items may omit it)
    pub fn from_value_with_kind(gvk: GroupVersionKind, value: Value) -> Result<Self, Error> {
        let Value::Object(mut doc) = value else {
            return Err(Error::invalid(gvk.kind.clone(), "document is not an object"));
        };
        doc.remove("apiVersion");
        doc.remove("kind");
        Self::from_parts(gvk, doc)
    }

    fn from_parts(gvk: GroupVersionKind, mut doc: Map<String, Value>) -> Result<Self, Error> {
        let mut metadata = match doc.remove("metadata") {
            Some(Value::Object(m)) => m,
            Some(_) => return Err(Error::invalid(gvk.kind.clone(), "metadata is not an object")),
            None => Map::new(),
        };

        let name = take_string(&mut metadata, "name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::invalid(gvk.kind.clone(), "missing metadata.name"))?;
        let namespace = take_string(&mut metadata, "namespace").unwrap_or_default();
        let describe = ResourceKey::new(gvk.clone(), namespace.clone(), name.clone()).to_string();

        let uid = take_string(&mut metadata, "uid");
        let resource_version = take_string(&mut metadata, "resourceVersion");
        let labels = take_string_map(&mut metadata, "labels", &describe)?;
        let annotations = take_string_map(&mut metadata, "annotations", &describe)?;
        let status = doc.remove("status").filter(|s| !s.is_null());

        Ok(Self {
            gvk,
            namespace,
            name,
            uid,
            resource_version,
            labels,
            annotations,
            extra_metadata: metadata,
            body: doc,
            status,
        })
    }

    /// Encode as a full JSON document
    pub fn to_value(&self) -> Value {
        let mut metadata = self.extra_metadata.clone();
        metadata.insert("name".to_string(), Value::String(self.name.clone()));
        if !self.namespace.is_empty() {
            metadata.insert("namespace".to_string(), Value::String(self.namespace.clone()));
        }
        if let Some(uid) = &self.uid {
            metadata.insert("uid".to_string(), Value::String(uid.clone()));
        }
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".to_string(), Value::String(rv.clone()));
        }
        if !self.labels.is_empty() {
            metadata.insert("labels".to_string(), string_map_value(&self.labels));
        }
        if !self.annotations.is_empty() {
            metadata.insert("annotations".to_string(), string_map_value(&self.annotations));
        }

        let mut doc = Map::new();
        doc.insert("apiVersion".to_string(), Value::String(self.gvk.api_version()));
        doc.insert("kind".to_string(), Value::String(self.gvk.kind.clone()));
        doc.insert("metadata".to_string(), Value::Object(metadata));
        for (k, v) in &self.body {
            doc.insert(k.clone(), v.clone());
        }
        if let Some(status) = &self.status {
            doc.insert("status".to_string(), status.clone());
        }
        Value::Object(doc)
    }

    /// Decode a kube-rs dynamic object of a known kind
    pub fn from_dynamic(gvk: GroupVersionKind, obj: DynamicObject) -> Result<Self, Error> {
        let value = serde_json::to_value(obj)
            .map_err(|e| Error::invalid(gvk.kind.clone(), format!("failed to encode object: {}", e)))?;
        Self::from_value_with_kind(gvk, value)
    }

    /// Encode as a kube-rs dynamic object
    pub fn to_dynamic(&self) -> Result<DynamicObject, Error> {
        serde_json::from_value(self.to_value())
            .map_err(|e| Error::invalid(self.key().to_string(), format!("failed to decode object: {}", e)))
    }

    /// Copy suitable for creating in another store
    ///
    /// Clears uid, resourceVersion, status and metadata the origin store assigned.
    /// Annotations are kept, including the paused marker.
    pub fn for_create(&self) -> Self {
        let mut copy = self.clone();
        copy.uid = None;
        copy.resource_version = None;
        copy.status = None;
        for field in TRANSIENT_METADATA {
            copy.extra_metadata.remove(*field);
        }
        copy
    }

    /// Look up an annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Set an annotation, returning whether the value changed
    pub fn set_annotation(&mut self, key: &str, value: &str) -> bool {
        if self.annotation(key) == Some(value) {
            return false;
        }
        self.annotations.insert(key.to_string(), value.to_string());
        true
    }

    /// Remove an annotation, returning whether it was present
    pub fn remove_annotation(&mut self, key: &str) -> bool {
        self.annotations.remove(key).is_some()
    }

    /// True when the paused marker is set
    pub fn is_paused(&self) -> bool {
        self.annotation(PAUSED_ANNOTATION) == Some(PAUSED_VALUE)
    }

    /// Read a nested string field from the body, e.g. `["spec", "providerID"]`
    pub fn body_str(&self, path: &[&str]) -> Option<&str> {
        let (first, rest) = path.split_first()?;
        let mut current = self.body.get(*first)?;
        for segment in rest {
            current = current.get(*segment)?;
        }
        current.as_str()
    }

    /// Write a nested string field into the body, creating intermediate objects
    pub fn set_body_str(&mut self, path: &[&str], value: &str) -> Result<(), Error> {
        let describe = self.key().to_string();
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::invalid(describe, "empty field path"));
        };
        let mut current = &mut self.body;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::invalid(
                        describe,
                        format!("{} is not an object", segment),
                    ))
                }
            };
        }
        current.insert(last.to_string(), Value::String(value.to_string()));
        Ok(())
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn take_string_map(
    map: &mut Map<String, Value>,
    key: &str,
    describe: &str,
) -> Result<BTreeMap<String, String>, Error> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(entries)) => entries
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k, s)),
                _ => Err(Error::invalid(describe, format!("metadata.{}.{} is not a string", key, k))),
            })
            .collect(),
        Some(_) => Err(Error::invalid(describe, format!("metadata.{} is not an object", key))),
    }
}

fn string_map_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
