//! # Provisioning Orchestration
//!
//! The execution half of the crate: node actions (provisioner upserts,
//! readiness polls, retried commands), failure classification, and the
//! dependency-graph coordinator that sequences heterogeneous external
//! control planes into a consistent running state.
//!
//! Structure (leaf to root):
//!
//! - [`provisioner`] - idempotent upsert of one external resource
//! - [`readiness`] - bounded polling for "created" vs "ready" convergence
//! - [`command_executor`] - retried execution of idempotent commands
//! - [`error_classifier`] - retryable vs fatal failure classification
//! - [`coordinator`] - topological scheduling with bounded parallelism
//! - [`types`] - execution options and the audit report

pub mod command_executor;
pub mod context;
pub mod coordinator;
pub mod error_classifier;
pub mod provisioner;
pub mod readiness;
pub mod types;

pub use command_executor::{
    CommandAction, CommandExecutor, CommandOutcome, CommandRunner, CommandSpec, ShellCommandRunner,
};
pub use context::RunContext;
pub use coordinator::Coordinator;
pub use error_classifier::{
    ErrorCategory, ErrorClassification, ErrorClassifier, StandardErrorClassifier,
};
pub use provisioner::{
    DestroyAction, ProvisionAction, ResourceProvisioner, ResourceRef, ResourceRefs,
};
pub use readiness::{ReadinessAction, ReadinessPoller, ReadinessProbe};
pub use types::{ExecutionOptions, FailurePolicy, NodeResult, RunOutcome, RunReport};
