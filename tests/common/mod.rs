//! Shared test doubles for orchestration scenarios.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use provision_core::error::{ProvisionError, Result};
use provision_core::graph::NodeAction;
use provision_core::orchestration::{ReadinessProbe, ResourceProvisioner, ResourceRef, RunContext};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Execution log shared across actions, recording completion order.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Action that records its execution and optionally fails or publishes a
/// resource reference.
pub struct TrackingAction {
    pub name: String,
    pub log: ExecutionLog,
    pub fail: bool,
    pub publishes: Option<ResourceRef>,
}

impl TrackingAction {
    pub fn ok(name: &str, log: &ExecutionLog) -> Arc<dyn NodeAction> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            fail: false,
            publishes: None,
        })
    }

    pub fn failing(name: &str, log: &ExecutionLog) -> Arc<dyn NodeAction> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            fail: true,
            publishes: None,
        })
    }

    pub fn publishing(name: &str, log: &ExecutionLog, resource: ResourceRef) -> Arc<dyn NodeAction> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            fail: false,
            publishes: Some(resource),
        })
    }
}

#[async_trait]
impl NodeAction for TrackingAction {
    async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.log.lock().push(self.name.clone());
        if self.fail {
            return Err(ProvisionError::TransientProvider {
                operation: self.name.clone(),
                reason: "induced failure".to_string(),
            });
        }
        Ok(self.publishes.clone())
    }
}

/// Idempotent upsert double: creates on the first call, converges on every
/// later call, and counts both so re-run tests can prove no duplication.
pub struct CountingProvisioner {
    pub kind: String,
    pub name: String,
    pub ensure_calls: AtomicU32,
    pub created: AtomicBool,
    pub create_count: AtomicU32,
}

impl CountingProvisioner {
    pub fn new(kind: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.to_string(),
            name: name.to_string(),
            ensure_calls: AtomicU32::new(0),
            created: AtomicBool::new(false),
            create_count: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ResourceProvisioner for CountingProvisioner {
    fn resource_kind(&self) -> &str {
        &self.kind
    }

    async fn ensure(&self, _ctx: &RunContext) -> Result<ResourceRef> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if !self.created.swap(true, Ordering::SeqCst) {
            self.create_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ResourceRef::new(&self.kind, &self.name))
    }
}

/// Probe that becomes ready after a fixed number of checks (or never,
/// with `u32::MAX`).
pub struct ScriptedProbe {
    pub target: String,
    pub ready_on: u32,
    pub checks: AtomicU32,
}

impl ScriptedProbe {
    pub fn ready_after(target: &str, ready_on: u32) -> Arc<Self> {
        Arc::new(Self {
            target: target.to_string(),
            ready_on,
            checks: AtomicU32::new(0),
        })
    }

    pub fn never_ready(target: &str) -> Arc<Self> {
        Self::ready_after(target, u32::MAX)
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    fn target(&self) -> &str {
        &self.target
    }

    async fn check(&self, _ctx: &RunContext) -> Result<bool> {
        let check = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(check >= self.ready_on)
    }
}
