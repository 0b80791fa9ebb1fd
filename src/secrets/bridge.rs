//! # Secret Materialization Bridge
//!
//! The two-hop trust path that gets externally-stored secrets into the
//! cluster without long-lived embedded credentials:
//!
//! 1. provision the secret store and populate it (access policy included),
//! 2. provision a workload identity with a federated-trust binding scoped
//!    to a (namespace, service account) pair — steps 1 and 2 are mutually
//!    order-independent, both must precede step 3,
//! 3. wait for the cluster-side secret-sync controller and its admission
//!    webhook to report ready,
//! 4. declare the cluster-scoped store connection binding the vault to the
//!    identity and poll until the cluster reports it ready,
//! 5. ensure the target namespace, apply the per-application key-sync
//!    resource with retry, and poll until the local secret materializes.
//!
//! The application deploy node may only depend on step 5. Partial
//! completion (identity created but federation missing, connection applied
//! but not ready) is never success: each step records its completion in
//! the shared [`BridgeTracker`] and later steps refuse to run without
//! their prerequisites, independent of graph wiring.

use super::records::SecretRecord;
use crate::error::{ProvisionError, Result};
use crate::graph::node::{NodeAction, NodeId, NodeSpec};
use crate::graph::GraphBuilder;
use crate::orchestration::context::RunContext;
use crate::orchestration::provisioner::{ResourceProvisioner, ResourceRef};
use crate::orchestration::readiness::{ReadinessPoller, ReadinessProbe};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Writes secret records into the external store.
#[async_trait]
pub trait SecretStoreWriter: Send + Sync {
    async fn put(&self, record: &SecretRecord, ctx: &RunContext) -> Result<()>;
}

/// Applies one cluster-side declarative resource (idempotent apply
/// semantics required).
#[async_trait]
pub trait ClusterApplier: Send + Sync {
    /// Label for the resource being applied
    fn resource(&self) -> &str;
    async fn apply(&self, ctx: &RunContext) -> Result<()>;
}

/// Progress flags for the bridge, shared by its five node actions.
#[derive(Debug, Default)]
struct BridgeProgress {
    store_provisioned: bool,
    identity_bound: bool,
    controller_ready: bool,
    connection_ready: bool,
    materialized: bool,
}

/// Coarse phase for audit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    NotStarted,
    TrustProvisioning,
    ControllerReady,
    ConnectionReady,
    Materialized,
}

#[derive(Debug, Default)]
pub struct BridgeTracker {
    progress: Mutex<BridgeProgress>,
}

impl BridgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BridgePhase {
        let progress = self.progress.lock();
        if progress.materialized {
            BridgePhase::Materialized
        } else if progress.connection_ready {
            BridgePhase::ConnectionReady
        } else if progress.controller_ready {
            BridgePhase::ControllerReady
        } else if progress.store_provisioned || progress.identity_bound {
            BridgePhase::TrustProvisioning
        } else {
            BridgePhase::NotStarted
        }
    }

    /// Only true once every step, including key synchronization, has
    /// completed. Dependents must treat anything less as not done.
    pub fn is_materialized(&self) -> bool {
        self.progress.lock().materialized
    }

    fn mark_store_provisioned(&self) {
        self.progress.lock().store_provisioned = true;
    }

    fn mark_identity_bound(&self) {
        self.progress.lock().identity_bound = true;
    }

    fn mark_controller_ready(&self) {
        self.progress.lock().controller_ready = true;
    }

    fn mark_connection_ready(&self) -> Result<()> {
        let mut progress = self.progress.lock();
        if !(progress.store_provisioned && progress.identity_bound && progress.controller_ready) {
            return Err(ProvisionError::Internal(
                "store connection declared before vault, identity, and sync controller were all ready"
                    .to_string(),
            ));
        }
        progress.connection_ready = true;
        Ok(())
    }

    fn mark_materialized(&self) -> Result<()> {
        let mut progress = self.progress.lock();
        if !progress.connection_ready {
            return Err(ProvisionError::Internal(
                "key sync attempted before the store connection was ready".to_string(),
            ));
        }
        progress.materialized = true;
        Ok(())
    }
}

/// Step 1: provision the vault plus access policy, then write the secret
/// records.
struct ProvisionStoreAction {
    vault: Arc<dyn ResourceProvisioner>,
    writer: Arc<dyn SecretStoreWriter>,
    records: Vec<SecretRecord>,
    tracker: Arc<BridgeTracker>,
}

#[async_trait]
impl NodeAction for ProvisionStoreAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.vault.validate()?;
        let vault_ref = self.vault.ensure(ctx).await?;
        for record in &self.records {
            self.writer.put(record, ctx).await?;
        }
        info!(vault = %vault_ref.name, records = self.records.len(), "Secret store populated");
        self.tracker.mark_store_provisioned();
        Ok(Some(vault_ref))
    }
}

/// Step 2: provision the workload identity and its federated-trust binding.
struct BindIdentityAction {
    identity: Arc<dyn ResourceProvisioner>,
    namespace: String,
    service_account: String,
    tracker: Arc<BridgeTracker>,
}

#[async_trait]
impl NodeAction for BindIdentityAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.identity.validate()?;
        let identity_ref = self.identity.ensure(ctx).await?;
        info!(
            identity = %identity_ref.name,
            namespace = %self.namespace,
            service_account = %self.service_account,
            "Workload identity federated to cluster service account"
        );
        self.tracker.mark_identity_bound();
        Ok(Some(identity_ref))
    }
}

/// Step 3: wait for the secret-sync controller and its webhook.
struct AwaitSyncControllerAction {
    probe: Arc<dyn ReadinessProbe>,
    poller: ReadinessPoller,
    tracker: Arc<BridgeTracker>,
}

#[async_trait]
impl NodeAction for AwaitSyncControllerAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.poller.wait_until_ready(self.probe.as_ref(), ctx).await?;
        self.tracker.mark_controller_ready();
        Ok(None)
    }
}

/// Step 4: declare the cluster-scoped store connection and poll it ready.
struct DeclareConnectionAction {
    applier: Arc<dyn ClusterApplier>,
    probe: Arc<dyn ReadinessProbe>,
    poller: ReadinessPoller,
    tracker: Arc<BridgeTracker>,
}

#[async_trait]
impl NodeAction for DeclareConnectionAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.applier.apply(ctx).await?;
        self.poller.wait_until_ready(self.probe.as_ref(), ctx).await?;
        self.tracker.mark_connection_ready()?;
        info!(resource = %self.applier.resource(), "Secret store connection ready");
        Ok(None)
    }
}

/// Step 5: ensure the namespace, apply the key-sync resource, and poll
/// until the local secret exists with the expected keys.
struct MaterializeKeySyncAction {
    namespace_applier: Arc<dyn ClusterApplier>,
    sync_applier: Arc<dyn ClusterApplier>,
    secret_probe: Arc<dyn ReadinessProbe>,
    poller: ReadinessPoller,
    tracker: Arc<BridgeTracker>,
}

#[async_trait]
impl NodeAction for MaterializeKeySyncAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.namespace_applier.apply(ctx).await?;
        self.sync_applier.apply(ctx).await?;
        self.poller
            .wait_until_ready(self.secret_probe.as_ref(), ctx)
            .await?;
        self.tracker.mark_materialized()?;
        info!(resource = %self.sync_applier.resource(), "Synchronized secret materialized");
        Ok(None)
    }
}

/// Well-known node ids for the bridge subgraph.
pub mod nodes {
    pub const SECRET_STORE: &str = "secret-store";
    pub const WORKLOAD_IDENTITY: &str = "workload-identity";
    pub const SYNC_CONTROLLER_READY: &str = "secret-sync-controller-ready";
    pub const STORE_CONNECTION: &str = "secret-store-connection";
    pub const KEY_SYNC: &str = "secret-key-sync";
}

/// Assembles the five bridge steps into graph nodes with the edges the
/// protocol requires, returning the id the application deploy node must
/// depend on.
pub struct SecretMaterializationBridge {
    pub vault: Arc<dyn ResourceProvisioner>,
    pub store_writer: Arc<dyn SecretStoreWriter>,
    pub records: Vec<SecretRecord>,
    pub identity: Arc<dyn ResourceProvisioner>,
    pub namespace: String,
    pub service_account: String,
    pub controller_probe: Arc<dyn ReadinessProbe>,
    pub connection_applier: Arc<dyn ClusterApplier>,
    pub connection_probe: Arc<dyn ReadinessProbe>,
    pub namespace_applier: Arc<dyn ClusterApplier>,
    pub sync_applier: Arc<dyn ClusterApplier>,
    pub secret_probe: Arc<dyn ReadinessProbe>,
    pub poller: ReadinessPoller,
}

impl SecretMaterializationBridge {
    /// Add the bridge nodes to `builder`. `store_deps` gate step 1 (the
    /// vault sits on the cloud control plane), `identity_deps` gate step 2
    /// (federation binds to a cluster-local service principal, so the
    /// cluster must exist), and `controller_deps` gate step 3 (the sync
    /// controller must already be installed with established CRDs).
    pub fn register(
        self,
        builder: &mut GraphBuilder,
        store_deps: &[NodeId],
        identity_deps: &[NodeId],
        controller_deps: &[NodeId],
    ) -> (NodeId, Arc<BridgeTracker>) {
        let tracker = Arc::new(BridgeTracker::new());

        builder.add(
            NodeSpec::new(
                nodes::SECRET_STORE,
                Arc::new(ProvisionStoreAction {
                    vault: self.vault,
                    writer: self.store_writer,
                    records: self.records,
                    tracker: tracker.clone(),
                }),
            )
            .depends_on(store_deps.iter().cloned()),
        );

        builder.add(
            NodeSpec::new(
                nodes::WORKLOAD_IDENTITY,
                Arc::new(BindIdentityAction {
                    identity: self.identity,
                    namespace: self.namespace,
                    service_account: self.service_account,
                    tracker: tracker.clone(),
                }),
            )
            .depends_on(identity_deps.iter().cloned()),
        );

        builder.add(
            NodeSpec::new(
                nodes::SYNC_CONTROLLER_READY,
                Arc::new(AwaitSyncControllerAction {
                    probe: self.controller_probe,
                    poller: self.poller,
                    tracker: tracker.clone(),
                }),
            )
            .depends_on(controller_deps.iter().cloned()),
        );

        builder.add(
            NodeSpec::new(
                nodes::STORE_CONNECTION,
                Arc::new(DeclareConnectionAction {
                    applier: self.connection_applier,
                    probe: self.connection_probe,
                    poller: self.poller,
                    tracker: tracker.clone(),
                }),
            )
            .depends_on([
                nodes::SECRET_STORE,
                nodes::WORKLOAD_IDENTITY,
                nodes::SYNC_CONTROLLER_READY,
            ]),
        );

        builder.add(
            NodeSpec::new(
                nodes::KEY_SYNC,
                Arc::new(MaterializeKeySyncAction {
                    namespace_applier: self.namespace_applier,
                    sync_applier: self.sync_applier,
                    secret_probe: self.secret_probe,
                    poller: self.poller,
                    tracker: tracker.clone(),
                }),
            )
            .depends_on([nodes::STORE_CONNECTION]),
        );

        (NodeId::new(nodes::KEY_SYNC), tracker)
    }
}
