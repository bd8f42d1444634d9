//! Request and response bodies of the monitor's REST API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{TargetEntry, TargetSpec};

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// `PUT /api/targets/toggle`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub ip: String,
    pub enabled: bool,
}

/// Generic acknowledgement returned by target mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub target: Option<TargetSpec>,
}

/// `GET /api/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub monitoring_active: bool,
    pub targets: StatusTargets,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTargets {
    pub google_dns: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub custom_targets: BTreeMap<String, TargetEntry>,
}

/// `GET /api/targets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsResponse {
    pub default_targets: DefaultTargets,
    #[serde(default)]
    pub custom_targets: BTreeMap<String, TargetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTargets {
    pub google_dns: String,
    /// Resolved gateway address, when the backend could determine one.
    #[serde(default)]
    pub gateway: Option<String>,
}

/// `GET /api/reports`. Summary and failure details stay opaque: the client
/// lists reports, it never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportsResponse {
    #[serde(default)]
    pub active_failures: BTreeMap<String, Value>,
    #[serde(default)]
    pub reports: Vec<ReportEntry>,
    #[serde(default)]
    pub summary: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub filename: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(with = "crate::timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub modified: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: ReportKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Failure,
    Daily,
    #[default]
    #[serde(other)]
    Other,
}

/// `POST /api/reports/generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReportResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub filename: String,
}
