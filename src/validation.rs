//! Input validation for provisioning configuration.
//!
//! Format rules are enforced before any external call: UUID syntax for
//! subscription identifiers, CIDR syntax for network ranges, and
//! character-set rules for resource names. Invalid configuration fails the
//! run during pre-flight, never mid-provisioning.

use crate::error::{ProvisionError, Result};
use std::net::Ipv4Addr;
use uuid::Uuid;

/// DNS-label limit shared by most managed-resource name rules
const MAX_RESOURCE_NAME_LENGTH: usize = 63;

fn invalid(field: &str, reason: impl Into<String>) -> ProvisionError {
    ProvisionError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Subscription identifiers must be UUIDs.
pub fn validate_subscription_id(value: &str) -> Result<()> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| invalid("deployment.subscription_id", format!("{value} is not a UUID")))
}

/// Address ranges must be IPv4 CIDR notation (`a.b.c.d/prefix`).
pub fn validate_cidr(field: &str, value: &str) -> Result<()> {
    let Some((address, prefix)) = value.split_once('/') else {
        return Err(invalid(field, format!("{value} is missing a /prefix")));
    };

    let address: Ipv4Addr = address
        .parse()
        .map_err(|_| invalid(field, format!("{value} has an invalid IPv4 address")))?;

    let prefix: u32 = prefix
        .parse()
        .map_err(|_| invalid(field, format!("{value} has a non-numeric prefix")))?;
    if prefix > 32 {
        return Err(invalid(field, format!("{value} prefix must be 0-32")));
    }

    // Host bits below the mask must be zero
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    if u32::from(address) & !mask != 0 {
        return Err(invalid(
            field,
            format!("{value} has host bits set below the /{prefix} mask"),
        ));
    }

    Ok(())
}

/// Resource names: lowercase alphanumerics and hyphens, starting with a
/// letter, ending alphanumeric, at most 63 characters.
pub fn validate_resource_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(field, "name must not be empty"));
    }
    if value.len() > MAX_RESOURCE_NAME_LENGTH {
        return Err(invalid(
            field,
            format!(
                "name is {} characters (max {MAX_RESOURCE_NAME_LENGTH})",
                value.len()
            ),
        ));
    }

    let mut chars = value.chars();
    let first = chars.next().unwrap_or(' ');
    if !first.is_ascii_lowercase() {
        return Err(invalid(field, format!("{value} must start with a lowercase letter")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            field,
            format!("{value} may only contain lowercase letters, digits, and hyphens"),
        ));
    }
    if value.ends_with('-') {
        return Err(invalid(field, format!("{value} must not end with a hyphen")));
    }

    Ok(())
}

/// Regions: short lowercase alphanumeric identifiers (e.g. `eastus2`).
pub fn validate_region(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid("deployment.region", "region must not be empty"));
    }
    if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(invalid(
            "deployment.region",
            format!("{value} may only contain lowercase letters and digits"),
        ));
    }
    Ok(())
}
