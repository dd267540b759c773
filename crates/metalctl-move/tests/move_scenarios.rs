//! Whole-move scenarios over two in-memory stores

use std::sync::Arc;

use async_trait::async_trait;
use metalctl_common::registry::{bare_metal_host_kind, metal3_machine_kind, namespace_kind, node_kind};
use metalctl_common::testing::{MemoryStore, MockLifecycleManager};
use metalctl_common::{
    ConnectionDescriptor, DeleteOptions, ErrorKind, GroupVersionKind, IdentityField,
    LifecycleError, LifecycleManager, ManagedResource, Operation, ProviderSet, ResourceClient,
    LAST_UPDATED_FIELD,
};
use metalctl_move::{
    run_move, DependentKind, LifecycleMove, MigratableKinds, MigrationOrchestrator,
    MigrationSession, MoveError, MoveOptions, MovePhase,
};
use serde_json::{json, Value};

/// Lifecycle manager that moves machines between two in-memory stores
struct StoreLifecycle {
    source: Arc<MemoryStore>,
    target: Arc<MemoryStore>,
    machine: GroupVersionKind,
}

#[async_trait]
impl LifecycleManager for StoreLifecycle {
    async fn init(&self, _providers: &ProviderSet) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn delete(&self, _options: DeleteOptions) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn move_objects(
        &self,
        _source: &ConnectionDescriptor,
        _target: &ConnectionDescriptor,
        namespace: &str,
    ) -> Result<(), LifecycleError> {
        let failed = |e: metalctl_common::StoreError| LifecycleError::CommandFailed {
            command: "move".to_string(),
            stderr: e.to_string(),
        };
        for machine in self.source.list(&self.machine, namespace).await.map_err(failed)? {
            self.target.create(&machine.for_create()).await.map_err(failed)?;
            self.source
                .delete(&machine.gvk, &machine.namespace, &machine.name)
                .await
                .map_err(failed)?;
        }
        Ok(())
    }
}

fn doc(value: Value) -> ManagedResource {
    ManagedResource::from_value(value).unwrap()
}

fn namespace(name: &str) -> ManagedResource {
    let mut ns = ManagedResource::new(namespace_kind(), "", name);
    ns.uid = Some(format!("ns-{}", name));
    ns
}

fn session(source: &Arc<MemoryStore>, target: &Arc<MemoryStore>, kinds: MigratableKinds) -> MigrationSession {
    MigrationSession {
        source: source.clone(),
        target: target.clone(),
        namespace: "a".to_string(),
        kinds,
    }
}

async fn move_all(
    source: &Arc<MemoryStore>,
    target: &Arc<MemoryStore>,
    kinds: MigratableKinds,
) -> Result<metalctl_move::MoveReport, MoveError> {
    let lifecycle = StoreLifecycle {
        source: source.clone(),
        target: target.clone(),
        machine: kinds.machine.gvk.clone(),
    };
    let connection = ConnectionDescriptor::default();
    let mut orchestrator = MigrationOrchestrator::new(session(source, target, kinds), MoveOptions::default());
    run_move(
        &mut orchestrator,
        Some(LifecycleMove {
            manager: &lifecycle,
            source: &connection,
            target: &connection,
        }),
    )
    .await
}

fn generic_kinds() -> MigratableKinds {
    MigratableKinds {
        host: GroupVersionKind::new("example.io", "v1", "Host"),
        machine: DependentKind {
            gvk: GroupVersionKind::new("example.io", "v1", "Machine"),
            identity_field: IdentityField::parse("identity"),
            cluster_scoped: false,
        },
        node: None,
    }
}

#[tokio::test]
async fn host_and_dependent_follow_new_uid() {
    let kinds = generic_kinds();
    let source = Arc::new(MemoryStore::new());
    let mut h1 = ManagedResource::new(kinds.host.clone(), "a", "h1");
    h1.uid = Some("u1".to_string());
    h1.status = Some(json!({"ready": true}));
    source.seed(h1);
    let mut m1 = ManagedResource::new(kinds.machine.gvk.clone(), "a", "m1");
    m1.body.insert("identity".to_string(), json!("metal3://u1"));
    source.seed(m1);

    let target = Arc::new(MemoryStore::with_uids(["u2"]));
    target.seed(namespace("a"));

    move_all(&source, &target, kinds.clone()).await.unwrap();

    let host = target.object(&kinds.host, "a", "h1").unwrap();
    assert_eq!(host.uid.as_deref(), Some("u2"));
    assert_eq!(host.status.as_ref().unwrap()["ready"], true);
    assert!(!host.is_paused());

    let machine = target.object(&kinds.machine.gvk, "a", "m1").unwrap();
    assert_eq!(machine.body["identity"], "metal3://u2");
}

fn metal3_source() -> Arc<MemoryStore> {
    let source = Arc::new(MemoryStore::new());
    source.seed(doc(json!({
        "apiVersion": "metal3.io/v1alpha1",
        "kind": "BareMetalHost",
        "metadata": {"name": "node-0", "namespace": "a", "uid": "abc"},
        "spec": {
            "online": true,
            "bootMACAddress": "52:54:00:aa:bb:cc",
            "consumerRef": {
                "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
                "kind": "Metal3Machine",
                "name": "controlplane-0",
                "namespace": "a"
            }
        },
        "status": {
            "operationalStatus": "OK",
            "provisioning": {"state": "provisioned", "ID": "7a1f0c"},
            "lastUpdated": "2024-03-01T10:00:00Z"
        }
    })));
    source.seed(doc(json!({
        "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
        "kind": "Metal3Machine",
        "metadata": {"name": "controlplane-0", "namespace": "a"},
        "spec": {"providerID": "metal3://abc", "image": {"url": "http://172.22.0.1/images/ubuntu.qcow2"}}
    })));
    source
}

fn metal3_target() -> Arc<MemoryStore> {
    let target = Arc::new(MemoryStore::with_uids(["xyz"]));
    target.seed(namespace("a"));
    target.seed(doc(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": "controlplane-0", "uid": "node-uid"},
        "spec": {"providerID": "metal3://abc"}
    })));
    target
}

#[tokio::test]
async fn metal3_move_rewrites_machine_and_node() {
    let source = metal3_source();
    let target = metal3_target();

    let report = move_all(&source, &target, MigratableKinds::metal3()).await.unwrap();
    assert_eq!(report.paused, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.status_synced, 1);
    assert_eq!(report.machines_rewritten, 1);
    assert_eq!(report.nodes_rewritten, 1);
    assert_eq!(report.resumed, 1);

    let host = target.object(&bare_metal_host_kind(), "a", "node-0").unwrap();
    assert_eq!(host.uid.as_deref(), Some("xyz"));
    let status = host.status.unwrap();
    assert_eq!(status["provisioning"]["state"], "provisioned");
    assert_ne!(status[LAST_UPDATED_FIELD], "2024-03-01T10:00:00Z");

    let machine = target.object(&metal3_machine_kind(), "a", "controlplane-0").unwrap();
    assert_eq!(machine.body["spec"]["providerID"], "metal3://xyz");
    assert_eq!(machine.body["spec"]["image"]["url"], "http://172.22.0.1/images/ubuntu.qcow2");

    let node = target.object(&node_kind(), "", "controlplane-0").unwrap();
    assert_eq!(node.body["spec"]["providerID"], "metal3://xyz");

    // Source stays paused so its reconciler never acts on the moved host
    assert!(source.object(&bare_metal_host_kind(), "a", "node-0").unwrap().is_paused());
}

#[tokio::test]
async fn second_move_changes_nothing() {
    let source = metal3_source();
    let target = metal3_target();
    move_all(&source, &target, MigratableKinds::metal3()).await.unwrap();
    let settled = target.objects();

    target.clear_calls();
    let report = move_all(&source, &target, MigratableKinds::metal3()).await.unwrap();
    assert_eq!(report.paused, 0);
    assert_eq!(report.already_paused, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.status_synced, 0);
    assert_eq!(report.status_unchanged, 1);
    assert_eq!(report.machines_rewritten, 0);
    assert_eq!(report.nodes_rewritten, 0);
    assert_eq!(target.count(Operation::UpdateStatus), 0);

    // REPLICATED re-applies the source spec and pause marker, RESUMED clears it again
    let resettled = target.objects();
    assert_eq!(resettled.len(), settled.len());
    for (before, after) in settled.iter().zip(resettled.iter()) {
        assert_eq!(before.uid, after.uid);
        assert_eq!(before.body, after.body);
        assert_eq!(before.status, after.status);
        assert_eq!(before.annotations, after.annotations);
    }
}

#[tokio::test]
async fn identity_fix_rerun_is_noop() {
    let source = metal3_source();
    let target = metal3_target();
    move_all(&source, &target, MigratableKinds::metal3()).await.unwrap();

    let mut orchestrator = MigrationOrchestrator::new(
        session(&source, &target, MigratableKinds::metal3()),
        MoveOptions::default(),
    );
    target.clear_calls();
    orchestrator.run_phase(MovePhase::IdentityFixed).await.unwrap();
    assert_eq!(target.count(Operation::Update), 0);
    assert_eq!(orchestrator.report().machines_rewritten, 0);
}

#[tokio::test]
async fn rerun_after_status_sync_failure_completes() {
    let source = metal3_source();
    let target = metal3_target();
    target.fail_once(
        Operation::UpdateStatus,
        Some("BareMetalHost"),
        Some("node-0"),
        ErrorKind::Unavailable,
    );

    let err = move_all(&source, &target, MigratableKinds::metal3()).await.unwrap_err();
    assert_eq!(err.phase(), Some(MovePhase::StatusSynced));
    // Nothing past the failed phase ran
    let machine_moved = target.object(&metal3_machine_kind(), "a", "controlplane-0");
    assert!(machine_moved.is_none());

    let report = move_all(&source, &target, MigratableKinds::metal3()).await.unwrap();
    assert_eq!(report.already_paused, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(report.status_synced, 1);
    assert_eq!(report.machines_rewritten, 1);

    let host = target.object(&bare_metal_host_kind(), "a", "node-0").unwrap();
    assert_eq!(host.uid.as_deref(), Some("xyz"));
    assert!(!host.is_paused());
}

#[tokio::test]
async fn lifecycle_failure_stops_before_identity_fix() {
    let source = metal3_source();
    let target = metal3_target();
    let mut lifecycle = MockLifecycleManager::new();
    lifecycle
        .expect_move_objects()
        .withf(|_, _, namespace| namespace == "a")
        .times(1)
        .returning(|_, _, _| {
            Err(LifecycleError::CommandFailed {
                command: "clusterctl move".to_string(),
                stderr: "cluster not ready".to_string(),
            })
        });

    let connection = ConnectionDescriptor::default();
    let mut orchestrator = MigrationOrchestrator::new(
        session(&source, &target, MigratableKinds::metal3()),
        MoveOptions::default(),
    );
    let err = run_move(
        &mut orchestrator,
        Some(LifecycleMove {
            manager: &lifecycle,
            source: &connection,
            target: &connection,
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, MoveError::Lifecycle(_)));
    assert_eq!(orchestrator.next_phase(), Some(MovePhase::IdentityFixed));
    let node = target.object(&node_kind(), "", "controlplane-0").unwrap();
    assert_eq!(node.body["spec"]["providerID"], "metal3://abc");
}
