//! # Deployment Configuration
//!
//! YAML-backed configuration for one environment deployment. All values
//! are validated against format rules before graph construction; an
//! invalid configuration fails fast, before any external call.
//!
//! Mirrors the flat parameter set the workflow consumes: region and
//! naming, network ranges, the managed services to provision, the mesh
//! feature toggle, and the execution/retry/readiness tuning.

pub mod error;
pub mod loader;

use crate::orchestration::types::{ExecutionOptions, FailurePolicy};
use crate::orchestration::ReadinessPoller;
use crate::resilience::RetryPolicy;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::ConfigurationError;
pub use loader::ConfigManager;

/// Feature toggle name for the service-mesh subtree
pub const MESH_FEATURE: &str = "mesh";

/// Root configuration for one provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub deployment: DeploymentConfig,
    pub network: NetworkConfig,
    pub cluster: ClusterConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub vault: VaultConfig,
    pub identity: IdentityConfig,
    pub function: FunctionConfig,
    pub mesh: MeshConfig,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub backoff: BackoffSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
}

/// Environment identity and cloud scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Logical environment name (development, staging, production)
    pub environment: String,
    pub region: String,
    /// Prefix applied to every generated resource name
    pub name_prefix: String,
    /// Cloud subscription scope, UUID syntax
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vnet_cidr: String,
    pub cluster_subnet_cidr: String,
    pub database_subnet_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub node_count: u32,
    pub node_size: String,
    pub kubernetes_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub server_name: String,
    pub database_name: String,
    pub admin_username: String,
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub sku: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub name: String,
    /// Keys the cluster-side agent mirrors into the local secret
    pub synced_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub name: String,
    /// Namespace the federated service account lives in
    pub namespace: String,
    pub service_account: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub app_name: String,
    pub plan_sku: String,
}

/// The single boolean pruning the service-mesh subtree. Toggling it must
/// not change the shape of the remaining graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    pub enabled: bool,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub max_parallel: usize,
    pub failure_policy: FailurePolicy,
    pub run_deadline_seconds: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            failure_policy: FailurePolicy::HaltAll,
            run_deadline_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub max_attempts: u32,
    pub delay_seconds: u64,
    /// 1.0 keeps the delay fixed; anything greater grows it per attempt
    pub multiplier: f64,
    pub max_delay_seconds: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 10,
            multiplier: 1.0,
            max_delay_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSettings {
    pub interval_seconds: u64,
    pub max_attempts: u32,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            max_attempts: 30,
        }
    }
}

impl ProvisionConfig {
    /// Enforce every format rule. Called by the loader before the
    /// configuration is handed to graph construction.
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_subscription_id(&self.deployment.subscription_id)?;
        validation::validate_region(&self.deployment.region)?;
        validation::validate_resource_name("deployment.name_prefix", &self.deployment.name_prefix)?;

        validation::validate_cidr("network.vnet_cidr", &self.network.vnet_cidr)?;
        validation::validate_cidr("network.cluster_subnet_cidr", &self.network.cluster_subnet_cidr)?;
        validation::validate_cidr(
            "network.database_subnet_cidr",
            &self.network.database_subnet_cidr,
        )?;

        validation::validate_resource_name("cluster.name", &self.cluster.name)?;
        validation::validate_resource_name("database.server_name", &self.database.server_name)?;
        validation::validate_resource_name("cache.name", &self.cache.name)?;
        validation::validate_resource_name("vault.name", &self.vault.name)?;
        validation::validate_resource_name("identity.name", &self.identity.name)?;
        validation::validate_resource_name("identity.namespace", &self.identity.namespace)?;
        validation::validate_resource_name("function.app_name", &self.function.app_name)?;
        validation::validate_resource_name("mesh.namespace", &self.mesh.namespace)?;

        if self.execution.max_parallel == 0 {
            return Err(crate::error::ProvisionError::InvalidConfiguration {
                field: "execution.max_parallel".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.backoff.max_attempts == 0 {
            return Err(crate::error::ProvisionError::InvalidConfiguration {
                field: "backoff.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.readiness.max_attempts == 0 {
            return Err(crate::error::ProvisionError::InvalidConfiguration {
                field: "readiness.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Feature toggles enabled for this run, resolved once.
    pub fn enabled_features(&self) -> Vec<String> {
        let mut features = Vec::new();
        if self.mesh.enabled {
            features.push(MESH_FEATURE.to_string());
        }
        features
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            max_parallel: self.execution.max_parallel,
            failure_policy: self.execution.failure_policy,
            run_deadline: self.execution.run_deadline_seconds.map(Duration::from_secs),
            enabled_features: self.enabled_features(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if (self.backoff.multiplier - 1.0).abs() < f64::EPSILON {
            RetryPolicy::fixed(
                self.backoff.max_attempts,
                Duration::from_secs(self.backoff.delay_seconds),
            )
        } else {
            RetryPolicy::exponential(
                self.backoff.max_attempts,
                Duration::from_secs(self.backoff.delay_seconds),
                self.backoff.multiplier,
                Duration::from_secs(self.backoff.max_delay_seconds),
            )
        }
    }

    pub fn readiness_poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(
            Duration::from_secs(self.readiness.interval_seconds),
            self.readiness.max_attempts,
        )
    }

    /// Prefixed resource name, e.g. `trading-dev-vnet`.
    pub fn prefixed(&self, suffix: &str) -> String {
        format!("{}-{}", self.deployment.name_prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn valid_config() -> ProvisionConfig {
        ProvisionConfig {
            deployment: DeploymentConfig {
                environment: "development".to_string(),
                region: "eastus2".to_string(),
                name_prefix: "trading-dev".to_string(),
                subscription_id: "bd12ae2c-78e0-4ec9-aac1-0a8bfc9ebc2e".to_string(),
            },
            network: NetworkConfig {
                vnet_cidr: "10.1.0.0/16".to_string(),
                cluster_subnet_cidr: "10.1.0.0/22".to_string(),
                database_subnet_cidr: "10.1.4.0/24".to_string(),
            },
            cluster: ClusterConfig {
                name: "aks-trading-dev".to_string(),
                node_count: 3,
                node_size: "Standard_DS2_v2".to_string(),
                kubernetes_version: "1.29".to_string(),
            },
            database: DatabaseConfig {
                server_name: "psql-trading-dev".to_string(),
                database_name: "accounts".to_string(),
                admin_username: "trading_admin".to_string(),
                sku: "GP_Standard_D2s_v3".to_string(),
            },
            cache: CacheConfig {
                name: "redis-trading-dev".to_string(),
                sku: "Basic".to_string(),
                capacity: 1,
            },
            vault: VaultConfig {
                name: "kv-trading-dev".to_string(),
                synced_keys: vec![
                    "database-connection-string".to_string(),
                    "cache-connection-string".to_string(),
                ],
            },
            identity: IdentityConfig {
                name: "id-trading-workload".to_string(),
                namespace: "trading".to_string(),
                service_account: "trading-app".to_string(),
            },
            function: FunctionConfig {
                app_name: "func-stock-quote".to_string(),
                plan_sku: "Y1".to_string(),
            },
            mesh: MeshConfig {
                enabled: true,
                namespace: "mesh-system".to_string(),
            },
            execution: ExecutionSettings::default(),
            backoff: BackoffSettings::default(),
            readiness: ReadinessSettings::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_bad_subscription_id_fails() {
        let mut config = valid_config();
        config.deployment.subscription_id = "oops".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_cidr_fails() {
        let mut config = valid_config();
        config.network.vnet_cidr = "10.1.0.0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_fails() {
        let mut config = valid_config();
        config.execution.max_parallel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mesh_toggle_controls_features() {
        let mut config = valid_config();
        assert_eq!(config.enabled_features(), vec![MESH_FEATURE.to_string()]);
        config.mesh.enabled = false;
        assert!(config.enabled_features().is_empty());
    }

    #[test]
    fn test_retry_policy_shape_follows_multiplier() {
        let mut config = valid_config();
        config.backoff.multiplier = 1.0;
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::fixed(3, Duration::from_secs(10))
        );

        config.backoff.multiplier = 2.0;
        let policy = config.retry_policy();
        assert_eq!(policy.delay_after(2), Duration::from_secs(20));
    }

    #[test]
    fn test_prefixed_names() {
        assert_eq!(valid_config().prefixed("vnet"), "trading-dev-vnet");
    }
}
