use thiserror::Error;

pub use crate::transport::TransportError;

/// A frame that could not be turned into a [`netpulse_proto::ServerMessage`].
/// The frame is dropped; the connection stays up.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("frame is not a valid envelope: {0}")]
    Json(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A well-formed message that a reconciliation handler refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("{0} is a built-in target")]
    BuiltinTarget(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mutation rejected: {0}")]
    Rejected(#[from] HandlerError),
    #[error("sync session has stopped")]
    Closed,
}
