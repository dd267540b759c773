//! [`ResourceClient`] backed by a Kubernetes API server

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::client::{PatchMode, ResourceClient};
use crate::error::{ErrorKind, Operation, StoreError};
use crate::registry::{KindRegistry, Scope};
use crate::resource::{GroupVersionKind, ManagedResource, ResourceKey};

/// Store client over kube-rs dynamic objects
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    registry: Arc<KindRegistry>,
}

impl KubeResourceClient {
    /// Wrap a kube client; kinds are resolved through `registry`
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }

    /// Underlying kube client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: &str) -> Api<DynamicObject> {
        let info = self.registry.resolve(gvk, namespace);
        match info.scope {
            Scope::Namespaced if !namespace.is_empty() => {
                Api::namespaced_with(self.client.clone(), namespace, &info.api_resource)
            }
            _ => Api::all_with(self.client.clone(), &info.api_resource),
        }
    }

    fn encode(&self, op: Operation, resource: &ManagedResource) -> Result<DynamicObject, StoreError> {
        self.registry
            .validate(resource)
            .and_then(|_| resource.to_dynamic())
            .map_err(|e| StoreError::new(ErrorKind::Invalid, op, resource.key(), e.to_string()))
    }

    fn decode(
        op: Operation,
        gvk: &GroupVersionKind,
        key: &ResourceKey,
        obj: DynamicObject,
    ) -> Result<ManagedResource, StoreError> {
        ManagedResource::from_dynamic(gvk.clone(), obj)
            .map_err(|e| StoreError::new(ErrorKind::Invalid, op, key.clone(), e.to_string()))
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManagedResource, StoreError> {
        let key = ResourceKey::new(gvk.clone(), namespace, name);
        let obj = self
            .api(gvk, namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(Operation::Get, key.clone(), e))?;
        Self::decode(Operation::Get, gvk, &key, obj)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Vec<ManagedResource>, StoreError> {
        let key = ResourceKey::new(gvk.clone(), namespace, "");
        let list = self
            .api(gvk, namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(Operation::List, key.clone(), e))?;
        debug!(kind = %gvk.kind, namespace, count = list.items.len(), "Listed resources");
        list.items
            .into_iter()
            .map(|obj| Self::decode(Operation::List, gvk, &key, obj))
            .collect()
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        if resource.uid.is_some() || resource.resource_version.is_some() {
            return Err(StoreError::new(
                ErrorKind::Invalid,
                Operation::Create,
                key,
                "uid and resourceVersion must be empty on create",
            ));
        }
        let obj = self.encode(Operation::Create, resource)?;
        let created = self
            .api(&resource.gvk, &resource.namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| StoreError::from_kube(Operation::Create, key.clone(), e))?;
        Self::decode(Operation::Create, &resource.gvk, &key, created)
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let obj = self.encode(Operation::Update, resource)?;
        let updated = self
            .api(&resource.gvk, &resource.namespace)
            .replace(&resource.name, &PostParams::default(), &obj)
            .await
            .map_err(|e| StoreError::from_kube(Operation::Update, key.clone(), e))?;
        Self::decode(Operation::Update, &resource.gvk, &key, updated)
    }

    async fn update_status(
        &self,
        resource: &ManagedResource,
    ) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let body = serde_json::to_vec(&resource.to_value()).map_err(|e| {
            StoreError::new(ErrorKind::Invalid, Operation::UpdateStatus, key.clone(), e.to_string())
        })?;
        let updated = self
            .api(&resource.gvk, &resource.namespace)
            .replace_status(&resource.name, &PostParams::default(), body)
            .await
            .map_err(|e| StoreError::from_kube(Operation::UpdateStatus, key.clone(), e))?;
        Self::decode(Operation::UpdateStatus, &resource.gvk, &key, updated)
    }

    async fn patch(
        &self,
        resource: &ManagedResource,
        mode: PatchMode,
    ) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let body = resource.to_value();
        let patch = match mode {
            PatchMode::Merge => Patch::Merge(&body),
        };
        let patched = self
            .api(&resource.gvk, &resource.namespace)
            .patch(&resource.name, &PatchParams::default(), &patch)
            .await
            .map_err(|e| StoreError::from_kube(Operation::Patch, key.clone(), e))?;
        Self::decode(Operation::Patch, &resource.gvk, &key, patched)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api(gvk, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| {
                StoreError::from_kube(Operation::Delete, ResourceKey::new(gvk.clone(), namespace, name), e)
            })
    }
}
