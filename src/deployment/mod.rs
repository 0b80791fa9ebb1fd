//! # Trading-Environment Deployment
//!
//! The concrete plan the orchestrator executes: CLI-backed providers, the
//! full dependency graph for the sample trading application, and the
//! pre/post verification sweeps.

pub mod checks;
pub mod plan;
pub mod providers;

pub use checks::{postcheck_specs, precheck_specs, run_checks, CheckReport, CheckSpec};
pub use plan::{build_plan, DeploymentPlan};
pub use providers::{
    CliClusterApplier, CliReadinessProbe, CliResourceProvisioner, VaultSecretWriter,
};
