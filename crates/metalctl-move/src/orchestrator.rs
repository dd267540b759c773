//! Phased migration of hosts between two stores
//!
//! A move runs five phases in order. Each phase re-derives what is left to
//! do from live state in both stores, so any phase can be re-entered after a
//! failure and a whole move can be re-run from the start.
//!
//! ```text
//! PAUSED_SOURCE   set the paused marker on every source host (Update)
//! REPLICATED      create each paused host at the target without uid/rv;
//!                 on AlreadyExists take the target's uid/rv and Update
//! STATUS_SYNCED   copy source status onto the same-named target host,
//!                 stamping status.lastUpdated
//! IDENTITY_FIXED  rewrite machine and node identities that point at a
//!                 host's old uid to its new uid
//! RESUMED         clear the paused marker on migrated target hosts
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use metalctl_common::registry::{bare_metal_host_kind, metal3_machine_kind, namespace_kind, node_kind};
use metalctl_common::{
    DependentView, GroupVersionKind, HostView, IdentityField, ManagedResource, ResourceClient,
    StoreError, LAST_UPDATED_FIELD, PAUSED_ANNOTATION, PAUSED_VALUE,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::MoveError;
use crate::identity::{self, METAL3_SCHEME};
use crate::pause::{await_quiescence, PauseObservation};

/// Phases of a move, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MovePhase {
    /// Source hosts carry the paused marker
    PausedSource,
    /// Every paused source host exists at the target
    Replicated,
    /// Target hosts carry the source status
    StatusSynced,
    /// Dependent identities point at target uids
    IdentityFixed,
    /// Target hosts no longer carry the paused marker
    Resumed,
}

impl MovePhase {
    /// Every phase in execution order
    pub const ALL: [MovePhase; 5] = [
        MovePhase::PausedSource,
        MovePhase::Replicated,
        MovePhase::StatusSynced,
        MovePhase::IdentityFixed,
        MovePhase::Resumed,
    ];

    /// Phase that follows this one
    pub fn next(self) -> Option<MovePhase> {
        match self {
            MovePhase::PausedSource => Some(MovePhase::Replicated),
            MovePhase::Replicated => Some(MovePhase::StatusSynced),
            MovePhase::StatusSynced => Some(MovePhase::IdentityFixed),
            MovePhase::IdentityFixed => Some(MovePhase::Resumed),
            MovePhase::Resumed => None,
        }
    }
}

impl fmt::Display for MovePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovePhase::PausedSource => "PAUSED_SOURCE",
            MovePhase::Replicated => "REPLICATED",
            MovePhase::StatusSynced => "STATUS_SYNCED",
            MovePhase::IdentityFixed => "IDENTITY_FIXED",
            MovePhase::Resumed => "RESUMED",
        };
        f.write_str(s)
    }
}

/// A kind whose objects embed a host identity string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentKind {
    /// Kind tag
    pub gvk: GroupVersionKind,
    /// Field holding the identity
    pub identity_field: IdentityField,
    /// Listed across all namespaces rather than the session namespace
    pub cluster_scoped: bool,
}

/// The kinds a move operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratableKinds {
    /// Kind that is replicated and paused
    pub host: GroupVersionKind,
    /// Machines consuming hosts
    pub machine: DependentKind,
    /// Host-level identity records (nodes), if rewritten at all
    pub node: Option<DependentKind>,
}

impl MigratableKinds {
    /// BareMetalHosts, Metal3Machines and Nodes
    pub fn metal3() -> Self {
        Self {
            host: bare_metal_host_kind(),
            machine: DependentKind {
                gvk: metal3_machine_kind(),
                identity_field: IdentityField::default(),
                cluster_scoped: false,
            },
            node: Some(DependentKind {
                gvk: node_kind(),
                identity_field: IdentityField::default(),
                cluster_scoped: true,
            }),
        }
    }
}

impl Default for MigratableKinds {
    fn default() -> Self {
        Self::metal3()
    }
}

/// The two stores and the scope of one move
///
/// Callers must not run two moves over the same source, target and namespace at once.
#[derive(Clone)]
pub struct MigrationSession {
    /// Store hosts are moved from
    pub source: Arc<dyn ResourceClient>,
    /// Store hosts are moved to
    pub target: Arc<dyn ResourceClient>,
    /// Namespace to move; empty moves every namespace
    pub namespace: String,
    /// Kinds to move and rewrite
    pub kinds: MigratableKinds,
}

/// Tunables of a move
#[derive(Debug, Clone)]
pub struct MoveOptions {
    /// Scheme of identity strings
    pub scheme: String,
    /// Whether to confirm the source reconciler honored the pause
    pub pause_observation: PauseObservation,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            scheme: METAL3_SCHEME.to_string(),
            pause_observation: PauseObservation::Disabled,
        }
    }
}

/// Per-phase counts of a move
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveReport {
    /// Identifier for correlating logs of one move
    pub move_id: String,
    /// Source hosts that got the paused marker
    pub paused: usize,
    /// Source hosts that already had it
    pub already_paused: usize,
    /// Hosts created at the target
    pub created: usize,
    /// Hosts that already existed at the target and were updated
    pub updated: usize,
    /// Target hosts whose status was written
    pub status_synced: usize,
    /// Target hosts whose status already matched
    pub status_unchanged: usize,
    /// Machine identities rewritten
    pub machines_rewritten: usize,
    /// Node identities rewritten
    pub nodes_rewritten: usize,
    /// Machines named by a consumerRef but absent from the target
    pub machines_missing: usize,
    /// Target hosts whose paused marker was removed
    pub resumed: usize,
}

/// A migrated host: same name in both stores, different uids
#[derive(Debug, Clone)]
struct HostLink {
    old_uid: String,
    target: HostView,
}

/// Drives a move phase by phase
///
/// [`step`](Self::step) runs the next phase and reports which one completed,
/// so a caller can log, confirm with a user, or delegate work between phases.
pub struct MigrationOrchestrator {
    session: MigrationSession,
    options: MoveOptions,
    next: Option<MovePhase>,
    report: MoveReport,
}

impl MigrationOrchestrator {
    /// Orchestrator positioned before PAUSED_SOURCE
    pub fn new(session: MigrationSession, options: MoveOptions) -> Self {
        Self {
            session,
            options,
            next: Some(MovePhase::PausedSource),
            report: MoveReport {
                move_id: uuid::Uuid::new_v4().to_string(),
                ..Default::default()
            },
        }
    }

    /// Namespace being moved
    pub fn namespace(&self) -> &str {
        &self.session.namespace
    }

    /// Phase the next [`step`](Self::step) will run
    pub fn next_phase(&self) -> Option<MovePhase> {
        self.next
    }

    /// Counts accumulated so far
    pub fn report(&self) -> &MoveReport {
        &self.report
    }

    /// Run the next phase
    ///
    /// Returns the phase that completed, or `None` once RESUMED has run.
    /// On error the position is unchanged, so stepping again re-enters the
    /// failed phase.
    pub async fn step(&mut self) -> Result<Option<MovePhase>, MoveError> {
        let Some(phase) = self.next else {
            return Ok(None);
        };
        self.run_phase(phase).await?;
        self.next = phase.next();
        Ok(Some(phase))
    }

    /// Run every remaining phase
    pub async fn run(&mut self) -> Result<MoveReport, MoveError> {
        while self.step().await?.is_some() {}
        Ok(self.report.clone())
    }

    /// Run one phase regardless of position
    pub async fn run_phase(&mut self, phase: MovePhase) -> Result<(), MoveError> {
        info!(
            move_id = %self.report.move_id,
            phase = %phase,
            namespace = %self.session.namespace,
            "Entering move phase"
        );
        match phase {
            MovePhase::PausedSource => self.pause_source().await,
            MovePhase::Replicated => self.replicate().await,
            MovePhase::StatusSynced => self.sync_status().await,
            MovePhase::IdentityFixed => self.fix_identities().await,
            MovePhase::Resumed => self.resume().await,
        }
    }

    async fn pause_source(&mut self) -> Result<(), MoveError> {
        let phase = MovePhase::PausedSource;
        self.options.pause_observation.validate()?;
        let source = self.session.source.clone();
        let hosts = self.list_hosts(source.as_ref(), phase).await?;

        let mut keys = Vec::with_capacity(hosts.len());
        for mut host in hosts {
            keys.push(host.key());
            if !host.set_annotation(PAUSED_ANNOTATION, PAUSED_VALUE) {
                debug!(resource = %host.key(), "Host already paused");
                self.report.already_paused += 1;
                continue;
            }
            source.update(&host).await.map_err(store(phase))?;
            info!(resource = %host.key(), "Paused host");
            self.report.paused += 1;
        }

        await_quiescence(source.as_ref(), &keys, self.options.pause_observation).await
    }

    async fn replicate(&mut self) -> Result<(), MoveError> {
        let phase = MovePhase::Replicated;
        let source = self.session.source.clone();
        let target = self.session.target.clone();

        let hosts: Vec<_> = self
            .list_hosts(source.as_ref(), phase)
            .await?
            .into_iter()
            .filter(|h| {
                if !h.is_paused() {
                    warn!(resource = %h.key(), "Skipping host without paused marker");
                }
                h.is_paused()
            })
            .collect();

        let namespaces: BTreeSet<_> = hosts
            .iter()
            .map(|h| h.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .collect();
        for namespace in &namespaces {
            ensure_namespace(target.as_ref(), namespace).await?;
        }

        for host in hosts {
            let desired = host.for_create();
            match target.create(&desired).await {
                Ok(created) => {
                    info!(
                        resource = %desired.key(),
                        uid = created.uid.as_deref().unwrap_or_default(),
                        "Replicated host"
                    );
                    self.report.created += 1;
                }
                Err(e) if e.is_already_exists() => {
                    let existing = target
                        .get(&desired.gvk, &desired.namespace, &desired.name)
                        .await
                        .map_err(store(phase))?;
                    let mut replacement = desired;
                    replacement.uid = existing.uid;
                    replacement.resource_version = existing.resource_version;
                    target.update(&replacement).await.map_err(store(phase))?;
                    debug!(resource = %replacement.key(), "Host already replicated, spec updated");
                    self.report.updated += 1;
                }
                Err(e) => return Err(store(phase)(e)),
            }
        }
        Ok(())
    }

    async fn sync_status(&mut self) -> Result<(), MoveError> {
        let phase = MovePhase::StatusSynced;
        let source_hosts = by_name(self.list_hosts(self.session.source.as_ref(), phase).await?);
        let target = self.session.target.clone();
        let target_hosts = self.list_hosts(target.as_ref(), phase).await?;

        for host in target_hosts {
            let Some(origin) = source_hosts.get(&(host.namespace.clone(), host.name.clone())) else {
                continue;
            };
            let Some(status) = origin.status.as_ref() else {
                debug!(resource = %host.key(), "Source host has no status to copy");
                continue;
            };
            if host.status.as_ref().map(without_last_updated) == Some(without_last_updated(status)) {
                debug!(resource = %host.key(), "Status already in sync");
                self.report.status_unchanged += 1;
                continue;
            }

            let mut write = host.clone();
            write.status = Some(stamped(status));
            target.update_status(&write).await.map_err(store(phase))?;
            info!(resource = %host.key(), "Copied host status");
            self.report.status_synced += 1;
        }
        Ok(())
    }

    async fn fix_identities(&mut self) -> Result<(), MoveError> {
        let phase = MovePhase::IdentityFixed;
        let target = self.session.target.clone();
        let links = self.host_links(phase).await?;
        if links.is_empty() {
            debug!("No migrated hosts, nothing to rewrite");
            return Ok(());
        }

        let machine_kind = self.session.kinds.machine.clone();
        let machine_namespace = if machine_kind.cluster_scoped {
            String::new()
        } else {
            self.session.namespace.clone()
        };
        let mut machines: BTreeMap<(String, String), ManagedResource> = target
            .list(&machine_kind.gvk, &machine_namespace)
            .await
            .map_err(store(phase))?
            .into_iter()
            .map(|m| ((m.namespace.clone(), m.name.clone()), m))
            .collect();

        // Machines named by a host's consumerRef
        for link in &links {
            let Some(consumer) = &link.target.consumer_ref else {
                continue;
            };
            if consumer.kind != machine_kind.gvk.kind {
                continue;
            }
            let namespace = link
                .target
                .consumer_namespace()
                .unwrap_or_default()
                .to_string();
            let machine = match machines.remove(&(namespace.clone(), consumer.name.clone())) {
                Some(machine) => machine,
                None => match target.get(&machine_kind.gvk, &namespace, &consumer.name).await {
                    Ok(machine) => machine,
                    Err(e) if e.is_not_found() => {
                        warn!(
                            host = %link.target.key,
                            machine = %consumer.name,
                            "Consumer machine not found at target"
                        );
                        self.report.machines_missing += 1;
                        continue;
                    }
                    Err(e) => return Err(store(phase)(e)),
                },
            };
            if self.rewrite_dependent(&machine_kind, machine, &link.target.uid).await? {
                self.report.machines_rewritten += 1;
            }
        }

        // Remaining machines are matched by the uid they point at
        for machine in machines.into_values() {
            if let Some(new_uid) = self.stale_link(&machine_kind, &machine, &links)? {
                if self.rewrite_dependent(&machine_kind, machine, &new_uid).await? {
                    self.report.machines_rewritten += 1;
                }
            }
        }

        if let Some(node_kind) = self.session.kinds.node.clone() {
            let node_namespace = if node_kind.cluster_scoped {
                String::new()
            } else {
                self.session.namespace.clone()
            };
            let nodes = target
                .list(&node_kind.gvk, &node_namespace)
                .await
                .map_err(store(phase))?;
            for node in nodes {
                if let Some(new_uid) = self.stale_link(&node_kind, &node, &links)? {
                    if self.rewrite_dependent(&node_kind, node, &new_uid).await? {
                        self.report.nodes_rewritten += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), MoveError> {
        let phase = MovePhase::Resumed;
        let source_hosts = by_name(self.list_hosts(self.session.source.as_ref(), phase).await?);
        let target = self.session.target.clone();
        let target_hosts = self.list_hosts(target.as_ref(), phase).await?;

        for mut host in target_hosts {
            if !source_hosts.contains_key(&(host.namespace.clone(), host.name.clone())) {
                continue;
            }
            if !host.remove_annotation(PAUSED_ANNOTATION) {
                continue;
            }
            target.update(&host).await.map_err(store(phase))?;
            info!(resource = %host.key(), "Resumed host");
            self.report.resumed += 1;
        }
        Ok(())
    }

    async fn list_hosts(
        &self,
        client: &dyn ResourceClient,
        phase: MovePhase,
    ) -> Result<Vec<ManagedResource>, MoveError> {
        client
            .list(&self.session.kinds.host, &self.session.namespace)
            .await
            .map_err(store(phase))
    }

    /// Pair every target host with the uid its source counterpart has
    async fn host_links(&self, phase: MovePhase) -> Result<Vec<HostLink>, MoveError> {
        let source_hosts = by_name(self.list_hosts(self.session.source.as_ref(), phase).await?);
        let target_hosts = self.list_hosts(self.session.target.as_ref(), phase).await?;

        let mut links = Vec::new();
        for host in &target_hosts {
            let Some(origin) = source_hosts.get(&(host.namespace.clone(), host.name.clone())) else {
                continue;
            };
            let target = HostView::try_from(host).map_err(invalid(phase))?;
            let origin = HostView::try_from(origin).map_err(invalid(phase))?;
            links.push(HostLink {
                old_uid: origin.uid,
                target,
            });
        }
        Ok(links)
    }

    /// New uid a dependent should point at, if it points at a migrated host's old uid
    fn stale_link(
        &self,
        kind: &DependentKind,
        dependent: &ManagedResource,
        links: &[HostLink],
    ) -> Result<Option<String>, MoveError> {
        let view = DependentView::parse(dependent, &kind.identity_field)
            .map_err(invalid(MovePhase::IdentityFixed))?;
        let Some(current) = view.identity.as_deref() else {
            return Ok(None);
        };
        Ok(links
            .iter()
            .find(|link| identity::points_at(current, &self.options.scheme, &link.old_uid))
            .map(|link| link.target.uid.clone()))
    }

    /// Point `dependent` at `new_uid`, writing only when it differs
    async fn rewrite_dependent(
        &self,
        kind: &DependentKind,
        dependent: ManagedResource,
        new_uid: &str,
    ) -> Result<bool, MoveError> {
        let phase = MovePhase::IdentityFixed;
        let view = DependentView::parse(&dependent, &kind.identity_field).map_err(invalid(phase))?;
        let current = view.identity.unwrap_or_default();
        let (expected, changed) = identity::rewrite(&current, new_uid, &self.options.scheme);
        if !changed {
            debug!(resource = %view.key, identity = %expected, "Identity already current");
            return Ok(false);
        }

        let updated = DependentView::with_identity(&dependent, &kind.identity_field, &expected)
            .map_err(invalid(phase))?;
        self.session
            .target
            .update(&updated)
            .await
            .map_err(store(phase))?;
        info!(resource = %view.key, from = %current, to = %expected, "Rewrote identity");
        Ok(true)
    }
}

/// Create the namespace at `client` unless it exists
async fn ensure_namespace(client: &dyn ResourceClient, namespace: &str) -> Result<(), MoveError> {
    let phase = MovePhase::Replicated;
    let kind = namespace_kind();
    match client.get(&kind, "", namespace).await {
        Ok(_) => {
            debug!(namespace, "Namespace already exists");
            return Ok(());
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(store(phase)(e)),
    }

    match client.create(&ManagedResource::new(kind, "", namespace)).await {
        Ok(_) => {
            info!(namespace, "Created namespace");
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(store(phase)(e)),
    }
}

fn by_name(resources: Vec<ManagedResource>) -> BTreeMap<(String, String), ManagedResource> {
    resources
        .into_iter()
        .map(|r| ((r.namespace.clone(), r.name.clone()), r))
        .collect()
}

fn without_last_updated(status: &Value) -> Value {
    let mut copy = status.clone();
    if let Some(map) = copy.as_object_mut() {
        map.remove(LAST_UPDATED_FIELD);
    }
    copy
}

fn stamped(status: &Value) -> Value {
    let mut copy = status.clone();
    if let Some(map) = copy.as_object_mut() {
        map.insert(
            LAST_UPDATED_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }
    copy
}

fn store(phase: MovePhase) -> impl Fn(StoreError) -> MoveError {
    move |source| MoveError::Store { phase, source }
}

fn invalid(phase: MovePhase) -> impl Fn(metalctl_common::Error) -> MoveError {
    move |source| MoveError::InvalidResource { phase, source }
}
