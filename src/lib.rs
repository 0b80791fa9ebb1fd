#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provision Core
//!
//! Dependency-ordered provisioning orchestrator: a DAG executor that
//! sequences heterogeneous external systems (cloud control plane,
//! Kubernetes API, service-mesh control plane, secret-sync operator, and a
//! relational database) into a consistent running state.
//!
//! ## Overview
//!
//! Nodes are "ensure resource/condition X is true" operations against
//! external control planes; edges are explicit dependency declarations.
//! Execution tolerates the eventual-consistency and transient-failure
//! characteristics of every system involved: provider APIs that return
//! "accepted" before the resource is usable, commands that fail for
//! reasons that clear on their own, and readiness that converges minutes
//! after creation.
//!
//! ## Key Properties
//!
//! - **Created ≠ ready**: readiness polling is a first-class step,
//!   distinct from provisioning
//! - **Typed failure taxonomy**: fatal configuration/permission/naming
//!   errors are never retried; transient provider errors are retried to a
//!   bounded budget, then escalated
//! - **Single-writer state**: the coordinator owns every status
//!   transition; resource references are write-once, read-only afterwards
//! - **Idempotent re-run**: running twice against converged infrastructure
//!   succeeds without duplicating resources
//!
//! ## Module Organization
//!
//! - [`graph`] - node/edge model, validation, topological ordering
//! - [`state_machine`] - per-node state transitions
//! - [`orchestration`] - coordinator, provisioner/poller/executor seams
//! - [`resilience`] - retry policy value objects
//! - [`secrets`] - secret records and the materialization bridge
//! - [`deployment`] - the sample trading-environment plan and checks
//! - [`config`] - validated, environment-aware configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provision_core::config::ConfigManager;
//! use provision_core::deployment::build_plan;
//! use provision_core::orchestration::{Coordinator, RunContext, ShellCommandRunner};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let plan = build_plan(manager.config(), Arc::new(ShellCommandRunner))?;
//!
//! let coordinator = Coordinator::new(manager.config().execution_options());
//! let report = coordinator.run(&plan.graph, Arc::new(RunContext::new())).await;
//! println!("{}", report.render_table());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod deployment;
pub mod error;
pub mod graph;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod secrets;
pub mod state_machine;
pub mod validation;

pub use config::{ConfigManager, ProvisionConfig};
pub use error::{ProvisionError, Result};
pub use graph::{Graph, GraphBuilder, Guard, NodeAction, NodeId, NodeSpec};
pub use orchestration::{
    Coordinator, ExecutionOptions, FailurePolicy, ReadinessPoller, ReadinessProbe,
    ResourceProvisioner, ResourceRef, RunContext, RunOutcome, RunReport,
};
pub use resilience::{BackoffStrategy, RetryPolicy};
pub use state_machine::NodeState;
