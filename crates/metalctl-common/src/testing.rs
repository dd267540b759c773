//! Test support: an in-memory resource store
//!
//! [`MemoryStore`] honors the store contract the installer and orchestrator
//! depend on: store-assigned uid and resourceVersion, optimistic concurrency
//! on update, a separate status subresource and JSON merge patch. It records
//! every call and can inject failures for a given operation and object.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client::{PatchMode, ResourceClient};
use crate::error::{ErrorKind, Operation, StoreError};
use crate::resource::{GroupVersionKind, ManagedResource, ResourceKey};

pub use crate::client::MockResourceClient;
pub use crate::lifecycle::MockLifecycleManager;

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation issued
    pub operation: Operation,
    /// Object addressed (name is empty for list)
    pub key: ResourceKey,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    kind: Option<String>,
    name: Option<String>,
    error: ErrorKind,
    remaining: Option<usize>,
}

impl Fault {
    fn matches(&self, operation: Operation, key: &ResourceKey) -> bool {
        self.operation == operation
            && self.remaining != Some(0)
            && self.kind.as_ref().map_or(true, |k| *k == key.gvk.kind)
            && self.name.as_ref().map_or(true, |n| *n == key.name)
    }
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKey, ManagedResource>,
    uids: VecDeque<String>,
    next_uid: u64,
    next_version: u64,
    calls: Vec<Call>,
    faults: Vec<Fault>,
}

impl State {
    fn next_uid(&mut self) -> String {
        self.uids.pop_front().unwrap_or_else(|| {
            self.next_uid += 1;
            format!("uid-{}", self.next_uid)
        })
    }

    fn next_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn begin(&mut self, operation: Operation, key: &ResourceKey) -> Result<(), StoreError> {
        self.calls.push(Call {
            operation,
            key: key.clone(),
        });
        if let Some(fault) = self.faults.iter_mut().find(|f| f.matches(operation, key)) {
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(StoreError::new(fault.error, operation, key.clone(), "injected failure"));
        }
        Ok(())
    }

    fn existing(&self, operation: Operation, key: &ResourceKey) -> Result<&ManagedResource, StoreError> {
        self.objects
            .get(key)
            .ok_or_else(|| StoreError::new(ErrorKind::NotFound, operation, key.clone(), "not found"))
    }

    fn check_version(
        operation: Operation,
        stored: &ManagedResource,
        given: Option<&str>,
    ) -> Result<(), StoreError> {
        if given != stored.resource_version.as_deref() {
            return Err(StoreError::new(
                ErrorKind::Conflict,
                operation,
                stored.key(),
                format!(
                    "resourceVersion {} does not match current {}",
                    given.unwrap_or("<none>"),
                    stored.resource_version.as_deref().unwrap_or("<none>")
                ),
            ));
        }
        Ok(())
    }
}

/// In-memory [`ResourceClient`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Empty store; uids are generated as `uid-1`, `uid-2`, ...
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that hands out the given uids first, in order
    pub fn with_uids<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.lock().uids = uids.into_iter().map(Into::into).collect();
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an object directly, status included, bypassing the call log
    ///
    /// Keeps the given uid or assigns one, and always assigns a new resourceVersion.
    pub fn seed(&self, resource: ManagedResource) -> ManagedResource {
        let mut state = self.lock();
        let mut stored = resource;
        if stored.uid.is_none() {
            stored.uid = Some(state.next_uid());
        }
        stored.resource_version = Some(state.next_version());
        state.objects.insert(stored.key(), stored.clone());
        stored
    }

    /// Current copy of an object
    pub fn object(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<ManagedResource> {
        self.lock()
            .objects
            .get(&ResourceKey::new(gvk.clone(), namespace, name))
            .cloned()
    }

    /// Every stored object, ordered by key
    pub fn objects(&self) -> Vec<ManagedResource> {
        self.lock().objects.values().cloned().collect()
    }

    /// Calls issued so far
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls of one operation
    pub fn count(&self, operation: Operation) -> usize {
        self.lock().calls.iter().filter(|c| c.operation == operation).count()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail every `operation` on objects matching `kind` and `name` (`None` matches any)
    pub fn fail_on(&self, operation: Operation, kind: Option<&str>, name: Option<&str>, error: ErrorKind) {
        self.push_fault(operation, kind, name, error, None);
    }

    /// Like [`MemoryStore::fail_on`] but only for the first matching call
    pub fn fail_once(&self, operation: Operation, kind: Option<&str>, name: Option<&str>, error: ErrorKind) {
        self.push_fault(operation, kind, name, error, Some(1));
    }

    fn push_fault(
        &self,
        operation: Operation,
        kind: Option<&str>,
        name: Option<&str>,
        error: ErrorKind,
        remaining: Option<usize>,
    ) {
        self.lock().faults.push(Fault {
            operation,
            kind: kind.map(str::to_string),
            name: name.map(str::to_string),
            error,
            remaining,
        });
    }

    /// Remove all injected failures
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }
}

#[async_trait]
impl ResourceClient for MemoryStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManagedResource, StoreError> {
        let key = ResourceKey::new(gvk.clone(), namespace, name);
        let mut state = self.lock();
        state.begin(Operation::Get, &key)?;
        state.existing(Operation::Get, &key).cloned()
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Vec<ManagedResource>, StoreError> {
        let key = ResourceKey::new(gvk.clone(), namespace, "");
        let mut state = self.lock();
        state.begin(Operation::List, &key)?;
        Ok(state
            .objects
            .values()
            .filter(|r| r.gvk == *gvk && (namespace.is_empty() || r.namespace == namespace))
            .cloned()
            .collect())
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let mut state = self.lock();
        state.begin(Operation::Create, &key)?;
        if resource.uid.is_some() || resource.resource_version.is_some() {
            return Err(StoreError::new(
                ErrorKind::Invalid,
                Operation::Create,
                key,
                "uid and resourceVersion must be empty on create",
            ));
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::new(
                ErrorKind::AlreadyExists,
                Operation::Create,
                key,
                "already exists",
            ));
        }

        let mut stored = resource.clone();
        stored.uid = Some(state.next_uid());
        stored.resource_version = Some(state.next_version());
        stored.status = None;
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let mut state = self.lock();
        state.begin(Operation::Update, &key)?;
        let current = state.existing(Operation::Update, &key)?.clone();
        State::check_version(Operation::Update, &current, resource.resource_version.as_deref())?;

        let mut stored = resource.clone();
        stored.uid = current.uid;
        stored.status = current.status;
        stored.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_status(
        &self,
        resource: &ManagedResource,
    ) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let mut state = self.lock();
        state.begin(Operation::UpdateStatus, &key)?;
        let mut stored = state.existing(Operation::UpdateStatus, &key)?.clone();
        State::check_version(
            Operation::UpdateStatus,
            &stored,
            resource.resource_version.as_deref(),
        )?;

        stored.status = resource.status.clone();
        stored.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn patch(
        &self,
        resource: &ManagedResource,
        mode: PatchMode,
    ) -> Result<ManagedResource, StoreError> {
        let key = resource.key();
        let mut state = self.lock();
        state.begin(Operation::Patch, &key)?;
        let current = state.existing(Operation::Patch, &key)?.clone();
        if resource.resource_version.is_some() {
            State::check_version(Operation::Patch, &current, resource.resource_version.as_deref())?;
        }

        let mut patch = resource.to_value();
        strip_unpatchable(&mut patch);
        let mut target = current.to_value();
        strip_unpatchable(&mut target);
        match mode {
            PatchMode::Merge => merge_patch(&mut target, &patch),
        }

        let mut stored = ManagedResource::from_value_with_kind(current.gvk.clone(), target)
            .map_err(|e| StoreError::new(ErrorKind::Invalid, Operation::Patch, key.clone(), e.to_string()))?;
        stored.uid = current.uid;
        stored.status = current.status;
        stored.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let key = ResourceKey::new(gvk.clone(), namespace, name);
        let mut state = self.lock();
        state.begin(Operation::Delete, &key)?;
        state.existing(Operation::Delete, &key)?;
        state.objects.remove(&key);
        Ok(())
    }
}

fn strip_unpatchable(doc: &mut Value) {
    if let Some(map) = doc.as_object_mut() {
        map.remove("status");
        if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
            metadata.remove("uid");
            metadata.remove("resourceVersion");
        }
    }
}

/// Apply a JSON merge patch (RFC 7386) in place
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
