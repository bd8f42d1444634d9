use netpulse_proto::{Envelope, ServerMessage};
use tracing::{trace, warn};

use crate::error::{HandlerError, ParseError};
use crate::state::DashboardState;

use super::handlers::{Applied, Reconciler};

/// Decode a raw text frame into a typed message.
pub fn parse(frame: &str) -> Result<ServerMessage, ParseError> {
    let envelope = Envelope::parse(frame).map_err(ParseError::Json)?;
    let kind = envelope.kind.clone();
    ServerMessage::from_envelope(envelope).map_err(|source| ParseError::Payload { kind, source })
}

/// Parse and dispatch one frame. Never fails: malformed frames and rejected
/// payloads are logged and dropped so the connection keeps going.
pub fn route(reconciler: &Reconciler, state: &mut DashboardState, frame: &str) -> Applied {
    let message = match parse(frame) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, frame = %preview(frame), "dropping unparseable frame");
            return Applied::default();
        }
    };

    let kind = message.kind().to_string();
    trace!(kind = %kind, "dispatching frame");
    match reconciler.apply(state, message) {
        Ok(applied) => applied,
        Err(err) => {
            log_rejection(&kind, &err);
            Applied::default()
        }
    }
}

fn log_rejection(kind: &str, err: &HandlerError) {
    warn!(kind, error = %err, "handler rejected message");
}

/// First part of a frame, for log lines.
fn preview(frame: &str) -> &str {
    const LIMIT: usize = 120;
    if frame.len() <= LIMIT {
        return frame;
    }
    let mut end = LIMIT;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reconciler() -> Reconciler {
        Reconciler::new(Duration::from_secs(3), Duration::from_secs(10))
    }

    #[test]
    fn parse_distinguishes_envelope_and_payload_errors() {
        assert!(matches!(parse("not json"), Err(ParseError::Json(_))));
        assert!(matches!(parse(r#"{"data":{}}"#), Err(ParseError::Json(_))));
        match parse(r#"{"type":"target_removed","data":{"name":"x"}}"#) {
            Err(ParseError::Payload { kind, .. }) => assert_eq!(kind, "target_removed"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_frames_leave_state_untouched() {
        let r = reconciler();
        let mut state = DashboardState::new(10, 5);
        let before = state.snapshot();

        for frame in [
            "{{{{",
            r#"{"type":"ping_result","data":{"target":"8.8.8.8"}}"#,
            r#"{"type":"target_added","data":{"ip":"gateway","name":"GW"}}"#,
            r#"{"type":"mystery","data":{}}"#,
        ] {
            let applied = route(&r, &mut state, frame);
            assert!(!applied.changed);
            assert!(applied.events.is_empty());
        }
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn valid_frame_after_garbage_is_applied() {
        let r = reconciler();
        let mut state = DashboardState::new(10, 5);
        route(&r, &mut state, "garbage");
        let applied = route(
            &r,
            &mut state,
            r#"{"type":"ping_result","data":{"target":"8.8.8.8","success":true,"latency":12.5,"timestamp":"2024-05-01T10:00:00"}}"#,
        );
        assert!(applied.changed);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let frame = "é".repeat(100);
        assert!(preview(&frame).len() <= 120);
    }
}
