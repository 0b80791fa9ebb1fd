use crate::error::Result;
use crate::orchestration::context::RunContext;
use crate::orchestration::provisioner::ResourceRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier for one unit of provisioning work in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Guard predicate gating whether a node executes or is pruned to `skipped`.
///
/// Guards are evaluated exactly once, at orchestration start, against the
/// feature set resolved from configuration. A pruned node satisfies its
/// dependents as if it had succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Run the node only when the named feature toggle is enabled
    FeatureEnabled(String),
}

impl Guard {
    pub fn evaluate(&self, enabled_features: &[String]) -> bool {
        match self {
            Guard::FeatureEnabled(feature) => enabled_features.iter().any(|f| f == feature),
        }
    }
}

/// The work a node performs when scheduled.
///
/// Implementations wrap a resource provisioner, a readiness poll, or a
/// retried command; the coordinator only sees this seam. Actions must be
/// idempotent: re-running a succeeded action against converged external
/// state must succeed without duplicating resources.
#[async_trait]
pub trait NodeAction: Send + Sync {
    /// Execute the node's work. A returned reference is published to the
    /// run's resource store for dependents to read.
    async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>>;
}

/// Action that does nothing. Used for grouping nodes and for teardown of
/// nodes whose resources are destroyed implicitly by a parent.
pub struct NoopAction;

#[async_trait]
impl NodeAction for NoopAction {
    async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
        Ok(None)
    }
}

/// One declared unit of provisioning work: identifier, action, predecessor
/// edges, and an optional guard.
#[derive(Clone)]
pub struct NodeSpec {
    pub id: NodeId,
    pub depends_on: Vec<NodeId>,
    pub guard: Option<Guard>,
    pub action: Arc<dyn NodeAction>,
    /// Action for the symmetric teardown pass; nodes without one are
    /// no-ops when the graph runs in reverse.
    pub teardown: Option<Arc<dyn NodeAction>>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, action: Arc<dyn NodeAction>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            guard: None,
            action,
            teardown: None,
        }
    }

    pub fn depends_on(mut self, predecessors: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        self.depends_on
            .extend(predecessors.into_iter().map(Into::into));
        self
    }

    pub fn guarded_by(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_teardown(mut self, action: Arc<dyn NodeAction>) -> Self {
        self.teardown = Some(action);
        self
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
