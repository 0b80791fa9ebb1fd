//! # Resource Provisioner Seam
//!
//! The unit of work in the provisioning graph: an idempotent declarative
//! upsert against one external control plane, returning an opaque
//! [`ResourceRef`] consumed by dependent nodes.
//!
//! "Created" and "ready" are distinct states; a provisioner only promises
//! the provider accepted the desired state. Functional readiness is the
//! [`crate::orchestration::readiness`] poller's job.

use super::context::RunContext;
use super::error_classifier::{ErrorClassifier, StandardErrorClassifier};
use crate::error::{ProvisionError, Result};
use crate::graph::node::{NodeAction, NodeId};
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque handle to a provisioned external resource: name, address,
/// attributes. Produced once by the creating node, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    /// Address, hostname, or connection endpoint where applicable
    pub endpoint: Option<String>,
    pub attributes: HashMap<String, String>,
    pub provisioned_at: DateTime<Utc>,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            endpoint: None,
            attributes: HashMap::new(),
            provisioned_at: Utc::now(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Write-once store of resource references keyed by producing node.
///
/// A node may only publish its own output, exactly once; dependents read
/// but never mutate. Violations are orchestrator bugs, not user errors.
#[derive(Debug, Default)]
pub struct ResourceRefs {
    inner: DashMap<NodeId, ResourceRef>,
}

impl ResourceRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, node: &NodeId, resource: ResourceRef) -> Result<()> {
        if self.inner.contains_key(node) {
            return Err(ProvisionError::Internal(format!(
                "resource reference for node {node} published twice"
            )));
        }
        debug!(node = %node, kind = %resource.kind, name = %resource.name, "Published resource reference");
        self.inner.insert(node.clone(), resource);
        Ok(())
    }

    pub fn get(&self, node: &NodeId) -> Option<ResourceRef> {
        self.inner.get(node).map(|entry| entry.value().clone())
    }

    /// Fetch a reference a dependent is entitled to assume exists.
    pub fn require(&self, node: &NodeId) -> Result<ResourceRef> {
        self.get(node).ok_or_else(|| {
            ProvisionError::Internal(format!(
                "resource reference for node {node} requested before it was produced"
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Idempotent declarative upsert of one external resource.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Resource kind label for logs and audit output
    fn resource_kind(&self) -> &str;

    /// Validate required fields before any external call is attempted.
    /// Failures here are fatal and never retried.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Create the resource if absent, or converge existing state toward the
    /// desired description. Must be safe to repeat.
    async fn ensure(&self, ctx: &RunContext) -> Result<ResourceRef>;

    /// Remove the resource during the symmetric teardown pass. Default:
    /// nothing to do (resource torn down implicitly by a parent).
    async fn destroy(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

/// Node action wrapping a provisioner in input validation plus a bounded
/// retry loop for transient provider failures.
pub struct ProvisionAction {
    provisioner: Arc<dyn ResourceProvisioner>,
    policy: RetryPolicy,
    classifier: Arc<dyn ErrorClassifier>,
}

impl ProvisionAction {
    pub fn new(provisioner: Arc<dyn ResourceProvisioner>, policy: RetryPolicy) -> Self {
        Self {
            provisioner,
            policy,
            classifier: Arc::new(StandardErrorClassifier::new()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

#[async_trait]
impl NodeAction for ProvisionAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.provisioner.validate()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provisioner.ensure(ctx).await {
                Ok(resource) => return Ok(Some(resource)),
                Err(error) => {
                    let classification = self.classifier.classify(&error, attempt, &self.policy);
                    if !classification.is_retryable {
                        return Err(error);
                    }
                    warn!(
                        kind = %self.provisioner.resource_kind(),
                        attempt = attempt,
                        category = %classification.category,
                        error = %error,
                        "Provisioner call failed, retrying"
                    );
                    if let Some(delay) = classification.retry_delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

/// Teardown counterpart to [`ProvisionAction`].
pub struct DestroyAction {
    provisioner: Arc<dyn ResourceProvisioner>,
    policy: RetryPolicy,
    classifier: Arc<dyn ErrorClassifier>,
}

impl DestroyAction {
    pub fn new(provisioner: Arc<dyn ResourceProvisioner>, policy: RetryPolicy) -> Self {
        Self {
            provisioner,
            policy,
            classifier: Arc::new(StandardErrorClassifier::new()),
        }
    }
}

#[async_trait]
impl NodeAction for DestroyAction {
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provisioner.destroy(ctx).await {
                Ok(()) => return Ok(None),
                Err(error) => {
                    let classification = self.classifier.classify(&error, attempt, &self.policy);
                    if !classification.is_retryable {
                        return Err(error);
                    }
                    if let Some(delay) = classification.retry_delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
