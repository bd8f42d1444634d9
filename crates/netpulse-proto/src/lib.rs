//! Shared protocol definitions for the netpulse monitor backend.
//! Keeping the wire shapes in a dedicated crate lets the dashboard client,
//! the REST SDK and test servers agree on them without pulling in runtime code.

pub mod api;
pub mod messages;
pub mod model;
pub mod timestamp;

pub use api::{
    CommandAck, DefaultTargets, ErrorBody, GenerateReportResponse, ReportEntry, ReportKind,
    ReportsResponse, StatusResponse, StatusTargets, TargetsResponse, ToggleRequest,
};
pub use messages::{ClientMessage, Envelope, ServerMessage};
pub use model::{
    is_builtin, FailureReport, InitialTargets, NetworkSpeedSample, PingResult, Target, TargetEntry,
    TargetOrigin, TargetRemoved, TargetSpec, TargetUpdated, BUILTIN_TARGETS, GATEWAY, GOOGLE_DNS,
};
