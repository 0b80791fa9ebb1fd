use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal and intermediate states for one provisioning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Initial state; the node has not been scheduled yet
    Pending,
    /// The node's action is currently executing
    Running,
    /// The node's action completed successfully
    Succeeded,
    /// The node's action failed terminally, or a dependency failed
    Failed,
    /// The node's guard predicate evaluated false; no side effects occurred
    Skipped,
}

impl NodeState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Check if the node is currently being processed
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if this state satisfies dependencies for downstream nodes.
    /// A skipped node satisfies dependents exactly as a succeeded one does;
    /// audit output still distinguishes the two.
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid node state: {s}")),
        }
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Pending
    }
}
