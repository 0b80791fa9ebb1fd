//! # Secret Records and Materialization
//!
//! Secret (key, value) records destined for the external store, and the
//! five-step bridge that mirrors them into a cluster-local secret via a
//! workload identity with federated trust.

pub mod bridge;
pub mod records;

pub use bridge::{
    BridgePhase, BridgeTracker, ClusterApplier, SecretMaterializationBridge, SecretStoreWriter,
};
pub use records::{SecretRecord, SecretValue};
