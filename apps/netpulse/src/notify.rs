use std::time::Duration;

use serde::Serialize;

use crate::transport::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Alert,
}

/// A transient message for the user. `ttl` is how long it stays visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(with = "ttl_millis")]
    pub ttl: Duration,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>, ttl: Duration) -> Self {
        Self {
            level,
            message: message.into(),
            ttl,
        }
    }
}

/// Side effects fanned out to UI subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Notify(Notification),
    /// The reports list changed on the server; re-query it.
    ReportsStale,
    Connection(ConnectionState),
}

mod ttl_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_millis() as u64)
    }
}
