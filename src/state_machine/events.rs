use serde::{Deserialize, Serialize};

/// Events that drive node state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEvent {
    /// All predecessors resolved and the guard (if any) evaluated true
    Start,
    /// The guard predicate evaluated false; node is pruned with no side effects
    Skip,
    /// The node's action returned success
    Complete,
    /// The node's action failed terminally, or an upstream dependency failed
    /// before the node could start
    Fail(String),
}

impl NodeEvent {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }
}
