use std::fmt;

/// A secret value. Never rendered by `Debug`/`Display`; callers must use
/// [`SecretValue::expose`] to read it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(REDACTED)")
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A (key, value) pair destined for the external secret store.
///
/// Written once by the provisioning step that computes or receives it;
/// rotation overwrites the value under the same key, never mutates in
/// place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub key: String,
    value: SecretValue,
}

impl SecretRecord {
    pub fn new(key: impl Into<String>, value: impl Into<SecretValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn value(&self) -> &SecretValue {
        &self.value
    }

    /// Rotation: a new record under the same key superseding this one.
    pub fn rotated(&self, value: impl Into<SecretValue>) -> Self {
        Self {
            key: self.key.clone(),
            value: value.into(),
        }
    }
}
