use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public resolver probed by every backend.
pub const GOOGLE_DNS: &str = "8.8.8.8";
/// Symbolic key for the host's default gateway.
pub const GATEWAY: &str = "gateway";

/// Targets the backend always probes. They can be toggled but never removed.
pub const BUILTIN_TARGETS: [(&str, &str); 2] = [(GOOGLE_DNS, "Google DNS"), (GATEWAY, "Gateway")];

pub fn is_builtin(key: &str) -> bool {
    BUILTIN_TARGETS.iter().any(|(builtin, _)| *builtin == key)
}

/// Outcome of one probe of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub target: String,
    pub success: bool,
    /// Round trip in milliseconds. The backend reports `0` for failed probes;
    /// the client store normalizes those to `None`.
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpeedSample {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOrigin {
    BuiltIn,
    Custom,
}

/// A monitored endpoint as tracked by the client registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub origin: TargetOrigin,
}

impl Target {
    pub fn builtin(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            enabled: true,
            origin: TargetOrigin::BuiltIn,
        }
    }

    pub fn custom(key: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            enabled,
            origin: TargetOrigin::Custom,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.origin == TargetOrigin::Custom
    }
}

/// `{ip, name, enabled}`: the `target_added` payload and the body of
/// create/update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub ip: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TargetSpec {
    pub fn new(ip: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            ip: ip.into(),
            name: name.into(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUpdated {
    pub ip: String,
    pub old_ip: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TargetUpdated {
    pub fn is_rename(&self) -> bool {
        self.old_ip != self.ip
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRemoved {
    pub ip: String,
}

/// Per-target record inside `custom_targets` maps. The backend attaches
/// bookkeeping fields (`added_at`, `updated_at`) that the client ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialTargets {
    #[serde(default)]
    pub custom_targets: BTreeMap<String, TargetEntry>,
}

/// Transient notice that a target crossed the failure threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub target: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub packets_lost: u64,
    #[serde(default)]
    pub consecutive_failures: u64,
    #[serde(with = "crate::timestamp")]
    pub start_time: DateTime<Utc>,
}

impl FailureReport {
    /// Name shown to users; falls back to the raw key when the backend sent none.
    pub fn display_name(&self) -> &str {
        if self.target_name.trim().is_empty() {
            &self.target
        } else {
            &self.target_name
        }
    }
}

fn default_enabled() -> bool {
    true
}
