//! Environment-aware configuration loading.
//!
//! A base `provision.yaml` plus an optional `provision.<environment>.yaml`
//! overlay, deep-merged at the mapping level. The merged document is
//! deserialized into [`ProvisionConfig`] and validated before it is
//! returned; callers never see an unvalidated configuration.

use super::error::ConfigurationError;
use super::ProvisionConfig;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_ENVIRONMENT: &str = "development";

pub struct ConfigManager {
    config: ProvisionConfig,
    environment: String,
    source: PathBuf,
}

impl ConfigManager {
    /// Load using `PROVISION_ENV` and `PROVISION_CONFIG_DIR`, with
    /// development defaults.
    pub fn load() -> Result<Self, ConfigurationError> {
        let environment =
            std::env::var("PROVISION_ENV").unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());
        let dir = std::env::var("PROVISION_CONFIG_DIR")
            .unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
        Self::load_from_dir(Path::new(&dir), &environment)
    }

    /// Load `provision.yaml` (+ optional environment overlay) from `dir`.
    pub fn load_from_dir(dir: &Path, environment: &str) -> Result<Self, ConfigurationError> {
        let base_path = dir.join("provision.yaml");
        let mut document = Self::read_yaml(&base_path)?;

        let overlay_path = dir.join(format!("provision.{environment}.yaml"));
        if overlay_path.exists() {
            debug!(overlay = %overlay_path.display(), "Applying environment overlay");
            let overlay = Self::read_yaml(&overlay_path)?;
            merge_yaml(&mut document, overlay);
        }

        let config: ProvisionConfig =
            serde_yaml::from_value(document).map_err(|error| ConfigurationError::Parse {
                path: base_path.display().to_string(),
                reason: error.to_string(),
            })?;

        config.validate()?;

        info!(
            environment = %environment,
            source = %base_path.display(),
            "Configuration loaded and validated"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            source: base_path,
        })
    }

    fn read_yaml(path: &Path) -> Result<Value, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigurationError::FileRead {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|error| ConfigurationError::Parse {
            path: path.display().to_string(),
            reason: error.to_string(),
        })
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Starter configuration written by `provisionctl init`.
    pub fn starter_yaml() -> &'static str {
        include_str!("starter.yaml")
    }
}

/// Deep merge: overlay mappings merge key-by-key, everything else replaces.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_base(dir: &Path) {
        fs::write(dir.join("provision.yaml"), ConfigManager::starter_yaml()).unwrap();
    }

    #[test]
    fn test_load_starter_config() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());

        let manager = ConfigManager::load_from_dir(dir.path(), "development").unwrap();
        assert_eq!(manager.environment(), "development");
        assert_eq!(manager.config().deployment.region, "eastus2");
    }

    #[test]
    fn test_environment_overlay_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        fs::write(
            dir.path().join("provision.production.yaml"),
            "cluster:\n  node_count: 5\nmesh:\n  enabled: false\n",
        )
        .unwrap();

        let manager = ConfigManager::load_from_dir(dir.path(), "production").unwrap();
        assert_eq!(manager.config().cluster.node_count, 5);
        assert!(!manager.config().mesh.enabled);
        // Untouched keys survive the merge
        assert_eq!(manager.config().cluster.name, "aks-trading-dev");
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigManager::load_from_dir(dir.path(), "development");
        assert!(matches!(result, Err(ConfigurationError::FileRead { .. })));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        fs::write(
            dir.path().join("provision.development.yaml"),
            "network:\n  vnet_cidr: not-a-cidr\n",
        )
        .unwrap();

        let result = ConfigManager::load_from_dir(dir.path(), "development");
        assert!(matches!(result, Err(ConfigurationError::Invalid(_))));
    }
}
