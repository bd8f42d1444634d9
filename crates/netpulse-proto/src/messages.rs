use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::{
    FailureReport, InitialTargets, NetworkSpeedSample, PingResult, TargetRemoved, TargetSpec,
    TargetUpdated,
};

/// Raw `{type, data}` frame as it arrives on the socket. `data` is optional on
/// the wire (`pong` frames omit it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Messages pushed from the monitor backend to dashboard clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    PingResult(PingResult),
    NetworkSpeed(NetworkSpeedSample),
    TargetAdded(TargetSpec),
    TargetUpdated(TargetUpdated),
    TargetRemoved(TargetRemoved),
    InitialTargets(InitialTargets),
    FailureReport(FailureReport),
    /// Heartbeat acknowledgement.
    Pong,
    /// A tag this client does not understand. Kept so callers decide explicitly.
    Unknown(String),
}

impl ServerMessage {
    pub const PING_RESULT: &'static str = "ping_result";
    pub const NETWORK_SPEED: &'static str = "network_speed";
    pub const TARGET_ADDED: &'static str = "target_added";
    pub const TARGET_UPDATED: &'static str = "target_updated";
    pub const TARGET_REMOVED: &'static str = "target_removed";
    pub const INITIAL_TARGETS: &'static str = "initial_targets";
    pub const FAILURE_REPORT: &'static str = "failure_report";
    pub const PONG: &'static str = "pong";

    /// Decode the payload of an envelope according to its tag.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, serde_json::Error> {
        let Envelope { kind, data } = envelope;
        let message = match kind.as_str() {
            Self::PING_RESULT => Self::PingResult(serde_json::from_value(data)?),
            Self::NETWORK_SPEED => Self::NetworkSpeed(serde_json::from_value(data)?),
            Self::TARGET_ADDED => Self::TargetAdded(serde_json::from_value(data)?),
            Self::TARGET_UPDATED => Self::TargetUpdated(serde_json::from_value(data)?),
            Self::TARGET_REMOVED => Self::TargetRemoved(serde_json::from_value(data)?),
            Self::INITIAL_TARGETS => Self::InitialTargets(serde_json::from_value(data)?),
            Self::FAILURE_REPORT => Self::FailureReport(serde_json::from_value(data)?),
            Self::PONG => Self::Pong,
            _ => Self::Unknown(kind),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::PingResult(_) => Self::PING_RESULT,
            Self::NetworkSpeed(_) => Self::NETWORK_SPEED,
            Self::TargetAdded(_) => Self::TARGET_ADDED,
            Self::TargetUpdated(_) => Self::TARGET_UPDATED,
            Self::TargetRemoved(_) => Self::TARGET_REMOVED,
            Self::InitialTargets(_) => Self::INITIAL_TARGETS,
            Self::FailureReport(_) => Self::FAILURE_REPORT,
            Self::Pong => Self::PONG,
            Self::Unknown(kind) => kind.as_str(),
        }
    }

    /// Encode as a JSON text frame, the way the backend broadcasts it.
    pub fn to_frame(&self) -> String {
        let data = match self {
            Self::PingResult(payload) => serde_json::to_value(payload),
            Self::NetworkSpeed(payload) => serde_json::to_value(payload),
            Self::TargetAdded(payload) => serde_json::to_value(payload),
            Self::TargetUpdated(payload) => serde_json::to_value(payload),
            Self::TargetRemoved(payload) => serde_json::to_value(payload),
            Self::InitialTargets(payload) => serde_json::to_value(payload),
            Self::FailureReport(payload) => serde_json::to_value(payload),
            Self::Pong | Self::Unknown(_) => Ok(json!({})),
        }
        .unwrap_or(Value::Null);
        json!({ "type": self.kind(), "data": data }).to_string()
    }
}

/// Messages sent from dashboard clients to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat to keep the connection alive.
    Ping,
}

impl ClientMessage {
    pub fn to_frame(&self) -> String {
        match self {
            Self::Ping => r#"{"type":"ping"}"#.to_string(),
        }
    }
}
