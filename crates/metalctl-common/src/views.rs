//! Typed views over the resource kinds the migration manipulates
//!
//! Views are built through validating conversions. A document that does not
//! have the expected shape is rejected with [`Error::InvalidResource`] rather
//! than read as an empty value.

use k8s_openapi::api::core::v1::Node;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::resource::{GroupVersionKind, ManagedResource, ResourceKey};

/// Field holding the provider identity on machines and nodes
pub const PROVIDER_ID_FIELD: &str = "spec.providerID";

/// A reference from a host to the machine consuming it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerRef {
    /// apiVersion of the consumer, when recorded
    pub api_version: Option<String>,
    /// Kind of the consumer
    pub kind: String,
    /// Namespace of the consumer, defaults to the host's
    pub namespace: Option<String>,
    /// Name of the consumer
    pub name: String,
}

/// Host-like resource: the object whose uid dependents point at
#[derive(Debug, Clone, PartialEq)]
pub struct HostView {
    /// Identity key
    pub key: ResourceKey,
    /// Store-assigned uid
    pub uid: String,
    /// Machine consuming this host, if any
    pub consumer_ref: Option<ConsumerRef>,
    /// Whether the paused marker is set
    pub paused: bool,
}

impl HostView {
    /// Namespace the consumer lives in
    pub fn consumer_namespace(&self) -> Option<&str> {
        self.consumer_ref
            .as_ref()
            .map(|c| c.namespace.as_deref().unwrap_or(&self.key.namespace))
    }
}

impl TryFrom<&ManagedResource> for HostView {
    type Error = Error;

    fn try_from(res: &ManagedResource) -> Result<Self, Error> {
        let describe = res.key().to_string();
        let uid = res
            .uid
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::invalid(&describe, "host has no uid"))?;

        let consumer_ref = match res.body.get("spec").and_then(|s| s.get("consumerRef")) {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => {
                let consumer: ConsumerRef = serde_json::from_value(value.clone())
                    .map_err(|e| Error::invalid(&describe, format!("invalid spec.consumerRef: {}", e)))?;
                if consumer.name.is_empty() {
                    return Err(Error::invalid(&describe, "spec.consumerRef.name is empty"));
                }
                Some(ConsumerRef {
                    namespace: consumer.namespace.filter(|n| !n.is_empty()),
                    ..consumer
                })
            }
            Some(_) => return Err(Error::invalid(&describe, "spec.consumerRef is not an object")),
        };

        Ok(Self {
            key: res.key(),
            uid,
            consumer_ref,
            paused: res.is_paused(),
        })
    }
}

/// Path to a string field inside a resource body, written `spec.providerID`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityField {
    segments: Vec<String>,
}

impl IdentityField {
    /// Parse a dotted path
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').filter(|s| !s.is_empty()).map(str::to_string).collect(),
        }
    }

    /// Path segments
    pub fn segments(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }
}

impl Default for IdentityField {
    fn default() -> Self {
        Self::parse(PROVIDER_ID_FIELD)
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Dependent resource carrying an embedded identity string
#[derive(Debug, Clone, PartialEq)]
pub struct DependentView {
    /// Identity key
    pub key: ResourceKey,
    /// Current identity string, if set
    pub identity: Option<String>,
}

impl DependentView {
    /// Read the identity at `field`, rejecting non-string values
    pub fn parse(res: &ManagedResource, field: &IdentityField) -> Result<Self, Error> {
        let describe = res.key().to_string();
        if is_node(&res.gvk) {
            // Nodes have a published schema; decode through it
            let node: Node = serde_json::from_value(res.to_value())
                .map_err(|e| Error::invalid(&describe, format!("not a valid Node: {}", e)))?;
            if field.segments() == ["spec", "providerID"] {
                return Ok(Self {
                    key: res.key(),
                    identity: node.spec.and_then(|s| s.provider_id),
                });
            }
        }

        let segments = field.segments();
        let mut current = None;
        if let Some((first, rest)) = segments.split_first() {
            current = res.body.get(*first);
            for segment in rest {
                current = current.and_then(|v| v.get(*segment));
            }
        }
        let identity = match current {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(Error::invalid(&describe, format!("{} is not a string", field))),
        };
        Ok(Self {
            key: res.key(),
            identity,
        })
    }

    /// Copy of `res` with the identity at `field` replaced
    pub fn with_identity(
        res: &ManagedResource,
        field: &IdentityField,
        identity: &str,
    ) -> Result<ManagedResource, Error> {
        let mut updated = res.clone();
        updated.set_body_str(&field.segments(), identity)?;
        Ok(updated)
    }
}

fn is_node(gvk: &GroupVersionKind) -> bool {
    gvk.group.is_empty() && gvk.version == "v1" && gvk.kind == "Node"
}
