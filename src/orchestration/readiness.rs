//! # Readiness Polling
//!
//! Provider APIs routinely return "accepted" before a resource is
//! functionally usable. This component closes that gap: it repeatedly
//! evaluates a side-effect-free probe until the target reports ready, or
//! fails with [`ProvisionError::ReadinessTimeout`] once the attempt budget
//! is spent.
//!
//! Distinct from the command executor: the poller retries an *observation*
//! of state that has not yet converged; the executor retries an *action*
//! that may fail for transient reasons.

use super::context::RunContext;
use crate::error::{ProvisionError, Result};
use crate::graph::node::NodeAction;
use crate::orchestration::provisioner::ResourceRef;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Side-effect-free query of external state: ready or not ready.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Label for the condition being awaited, used in logs and errors
    fn target(&self) -> &str;

    /// One observation. `Ok(true)` means the target is functionally usable.
    /// Transient errors are treated as "not ready yet"; any other error
    /// aborts the poll immediately.
    async fn check(&self, ctx: &RunContext) -> Result<bool>;
}

/// Bounded fixed-interval poller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessPoller {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll until the probe reports ready, or fail with `ReadinessTimeout`
    /// carrying the attempt count and elapsed time.
    pub async fn wait_until_ready(
        &self,
        probe: &dyn ReadinessProbe,
        ctx: &RunContext,
    ) -> Result<()> {
        let started = Instant::now();

        for attempt in 1..=self.max_attempts {
            match probe.check(ctx).await {
                Ok(true) => {
                    info!(
                        target_condition = probe.target(),
                        attempt = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Readiness condition met"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    debug!(
                        target_condition = probe.target(),
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        "Not ready yet"
                    );
                }
                Err(ProvisionError::TransientProvider { reason, .. }) => {
                    warn!(
                        target_condition = probe.target(),
                        attempt = attempt,
                        reason = %reason,
                        "Probe failed transiently, treating as not ready"
                    );
                }
                Err(fatal) => return Err(fatal),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(ProvisionError::ReadinessTimeout {
            target: probe.target().to_string(),
            attempts: self.max_attempts,
            elapsed: started.elapsed(),
        })
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 30)
    }
}

/// Node action awaiting one readiness condition.
pub struct ReadinessAction {
    probe: Arc<dyn ReadinessProbe>,
    poller: ReadinessPoller,
}

impl ReadinessAction {
    pub fn new(probe: Arc<dyn ReadinessProbe>, poller: ReadinessPoller) -> Self {
        Self { probe, poller }
    }
}

#[async_trait]
impl NodeAction for ReadinessAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.poller.wait_until_ready(self.probe.as_ref(), ctx).await?;
        Ok(None)
    }
}
