//! Client-side checks run before any request leaves the process.

use std::net::Ipv4Addr;

use netpulse_proto::{is_builtin, TargetSpec};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid IPv4 address: {0:?}")]
    InvalidIp(String),
    #[error("target name must not be empty")]
    EmptyName,
    #[error("{0} is a built-in target and cannot be added, edited or removed")]
    BuiltinTarget(String),
    #[error("target key must not be empty")]
    EmptyKey,
}

/// Custom targets are addressed by dotted-quad IPv4 literals.
pub fn validate_ip(ip: &str) -> Result<Ipv4Addr, ValidationError> {
    let trimmed = ip.trim();
    if is_builtin(trimmed) {
        return Err(ValidationError::BuiltinTarget(trimmed.to_string()));
    }
    trimmed
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::InvalidIp(ip.to_string()))
}

/// Validate a create/update body for a custom target and return it with
/// surrounding whitespace stripped from `ip` and `name`. Callers send the
/// returned spec, never the raw input.
pub fn validate_spec(spec: &TargetSpec) -> Result<TargetSpec, ValidationError> {
    let normalized = TargetSpec::new(spec.ip.trim(), spec.name.trim(), spec.enabled);
    validate_ip(&normalized.ip)?;
    if normalized.name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(normalized)
}

/// Keys accepted by the toggle endpoint: built-ins or custom IPv4 targets.
pub fn validate_toggle_key(key: &str) -> Result<(), ValidationError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    if is_builtin(trimmed) {
        return Ok(());
    }
    validate_ip(trimmed).map(|_| ())
}
