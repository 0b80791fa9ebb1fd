use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Failed to parse configuration file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] crate::error::ProvisionError),
}

impl From<ConfigurationError> for crate::error::ProvisionError {
    fn from(error: ConfigurationError) -> Self {
        match error {
            ConfigurationError::Invalid(inner) => inner,
            other => crate::error::ProvisionError::InvalidConfiguration {
                field: "config".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
