//! # System Constants
//!
//! Operational boundaries and status groupings for the provisioning
//! orchestrator.

// Re-export the node state type under its audit-facing name
pub use crate::state_machine::NodeState as NodeStatus;

/// System-wide constants
pub mod system {
    /// Upper bound on nodes in a single provisioning graph
    pub const MAX_GRAPH_NODES: usize = 500;

    /// Default service account name used when configuration omits one
    pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

    /// Version compatibility marker
    pub const PROVISION_CORE_VERSION: &str = "0.1.0";
}

/// Status groupings for validation and scheduling logic
pub mod status_groups {
    use super::NodeStatus;

    /// States that satisfy downstream dependencies
    pub const DEPENDENCY_SATISFYING_STATES: &[NodeStatus] =
        &[NodeStatus::Succeeded, NodeStatus::Skipped];

    /// States from which no further transition is allowed
    pub const TERMINAL_STATES: &[NodeStatus] = &[
        NodeStatus::Succeeded,
        NodeStatus::Failed,
        NodeStatus::Skipped,
    ];
}
