//! Error types for the provisioning orchestrator.
//!
//! The taxonomy separates pre-flight failures (`InvalidConfiguration`),
//! operator-actionable failures (`NameCollision`, `PermissionDenied`),
//! transient provider failures absorbed by retry policies, and the
//! escalated forms surfaced once a retry budget is exhausted
//! (`ReadinessTimeout`, `CommandFailed`). `DependencyFailed` is never
//! produced by a node's own action; the coordinator assigns it to every
//! transitive dependent of a failed node.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisionError {
    /// Configuration is malformed or violates a format rule. Always fatal,
    /// raised before any external call.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The requested resource name is taken by a foreign resource. The
    /// operator must rename; retrying cannot succeed.
    #[error("Name not available: {kind} {name} already exists outside this deployment")]
    NameCollision { kind: String, name: String },

    /// The provider rejected the call for lack of privileges. Fatal, never
    /// retried blindly.
    #[error("Permission denied during {operation}: {reason}")]
    PermissionDenied { operation: String, reason: String },

    /// A provider call failed for a reason expected to clear on its own.
    /// Absorbed by the enclosing retry policy.
    #[error("Transient provider error during {operation}: {reason}")]
    TransientProvider { operation: String, reason: String },

    /// A readiness poll exhausted its attempt budget without the target
    /// becoming usable.
    #[error("Readiness timeout for {target}: not ready after {attempts} attempts ({elapsed:?})")]
    ReadinessTimeout {
        target: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// An external command failed on every attempt allowed by its policy.
    #[error("Command failed after {attempts} attempts: {command}: {stderr}")]
    CommandFailed {
        command: String,
        attempts: u32,
        stderr: String,
    },

    /// A node's action failed terminally, after retries where applicable.
    #[error("Stage {node} failed: {reason}")]
    StageFailed { node: String, reason: String },

    /// A predecessor of this node failed; the node's action was never run.
    #[error("Stage {node} not run: dependency {failed_dependency} failed")]
    DependencyFailed {
        node: String,
        failed_dependency: String,
    },

    /// The whole-run deadline elapsed before the graph converged.
    #[error("Run deadline of {deadline:?} exceeded after {elapsed:?}")]
    DeadlineExceeded {
        deadline: Duration,
        elapsed: Duration,
    },

    /// Invariant violation inside the orchestrator itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Stage-level wrapper preserving the underlying failure text.
    pub fn stage_failed(node: impl Into<String>, source: &ProvisionError) -> Self {
        ProvisionError::StageFailed {
            node: node.into(),
            reason: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_stage() {
        let err = ProvisionError::StageFailed {
            node: "database".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("database"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_readiness_timeout_carries_attempts_and_elapsed() {
        let err = ProvisionError::ReadinessTimeout {
            target: "postgres-accepts-connections".to_string(),
            attempts: 30,
            elapsed: Duration::from_secs(300),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("30 attempts"));
        assert!(rendered.contains("postgres-accepts-connections"));
    }

    #[test]
    fn test_dependency_failed_names_both_nodes() {
        let err = ProvisionError::DependencyFailed {
            node: "app-deploy".to_string(),
            failed_dependency: "secret-sync".to_string(),
        };
        assert!(err.to_string().contains("app-deploy"));
        assert!(err.to_string().contains("secret-sync"));
    }
}
