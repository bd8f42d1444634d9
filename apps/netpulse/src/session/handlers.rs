//! Reconciliation: one function per server message kind, each turning a pushed
//! event into a state transition plus the side effects UI subscribers see.

use std::time::Duration;

use netpulse_proto::{
    FailureReport, InitialTargets, ServerMessage, TargetRemoved, TargetSpec, TargetUpdated,
};
use tracing::{debug, info};

use crate::error::HandlerError;
use crate::notify::{Notification, NotificationLevel, SessionEvent};
use crate::state::DashboardState;

use super::LocalMutation;

/// Result of applying one input to the store.
#[derive(Debug, Default, PartialEq)]
pub struct Applied {
    /// The store was mutated and a new snapshot should be published.
    pub changed: bool,
    pub events: Vec<SessionEvent>,
}

impl Applied {
    fn changed() -> Self {
        Self {
            changed: true,
            events: Vec::new(),
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }

    fn with_event(mut self, event: SessionEvent) -> Self {
        self.events.push(event);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    pub notice_ttl: Duration,
    pub alert_ttl: Duration,
}

impl Reconciler {
    pub fn new(notice_ttl: Duration, alert_ttl: Duration) -> Self {
        Self {
            notice_ttl,
            alert_ttl,
        }
    }

    pub fn apply(
        &self,
        state: &mut DashboardState,
        message: ServerMessage,
    ) -> Result<Applied, HandlerError> {
        match message {
            ServerMessage::PingResult(result) => {
                state.apply_ping_result(result)?;
                Ok(Applied::changed())
            }
            ServerMessage::NetworkSpeed(sample) => {
                state.apply_network_speed(sample)?;
                Ok(Applied::changed())
            }
            ServerMessage::TargetAdded(spec) => self.target_added(state, spec),
            ServerMessage::TargetUpdated(update) => self.target_updated(state, update),
            ServerMessage::TargetRemoved(removed) => self.target_removed(state, removed),
            ServerMessage::InitialTargets(initial) => Ok(initial_targets(state, initial)),
            ServerMessage::FailureReport(report) => Ok(self.failure_report(report)),
            ServerMessage::Pong => {
                debug!("heartbeat acknowledged");
                Ok(Applied::unchanged())
            }
            ServerMessage::Unknown(kind) => {
                debug!(kind = %kind, "ignoring unrecognized message");
                Ok(Applied::unchanged())
            }
        }
    }

    fn target_added(
        &self,
        state: &mut DashboardState,
        spec: TargetSpec,
    ) -> Result<Applied, HandlerError> {
        state.registry_mut().upsert_custom(&spec)?;
        info!(ip = %spec.ip, name = %spec.name, "target added");
        Ok(Applied::changed().with_event(self.notice(
            NotificationLevel::Success,
            format!("Target added: {}", label(&spec.name, &spec.ip)),
        )))
    }

    fn target_updated(
        &self,
        state: &mut DashboardState,
        update: TargetUpdated,
    ) -> Result<Applied, HandlerError> {
        let spec = TargetSpec::new(update.ip.clone(), update.name.clone(), update.enabled);
        if update.is_rename() {
            state.registry_mut().rename_custom(&update.old_ip, &spec)?;
            info!(old_ip = %update.old_ip, ip = %update.ip, "target renamed");
        } else {
            state.registry_mut().upsert_custom(&spec)?;
            info!(ip = %update.ip, "target updated");
        }
        Ok(Applied::changed().with_event(self.notice(
            NotificationLevel::Success,
            format!("Target updated: {}", label(&update.name, &update.ip)),
        )))
    }

    fn target_removed(
        &self,
        state: &mut DashboardState,
        removed: TargetRemoved,
    ) -> Result<Applied, HandlerError> {
        if !state.registry_mut().remove_custom(&removed.ip)? {
            debug!(ip = %removed.ip, "remove for unknown target ignored");
            return Ok(Applied::unchanged());
        }
        info!(ip = %removed.ip, "target removed");
        Ok(Applied::changed().with_event(self.notice(
            NotificationLevel::Info,
            format!("Target removed: {}", removed.ip),
        )))
    }

    fn failure_report(&self, report: FailureReport) -> Applied {
        info!(
            target_key = %report.target,
            packets_lost = report.packets_lost,
            consecutive_failures = report.consecutive_failures,
            "failure reported"
        );
        let message = format!(
            "FAILURE DETECTED: {} - {} packets lost",
            report.display_name(),
            report.packets_lost
        );
        Applied::unchanged()
            .with_event(SessionEvent::Notify(Notification::new(
                NotificationLevel::Alert,
                message,
                self.alert_ttl,
            )))
            .with_event(SessionEvent::ReportsStale)
    }

    /// Provisional updates submitted by command callers. Same transitions as
    /// the pushed events, without notifications: the echo will bring those.
    pub fn apply_local(
        &self,
        state: &mut DashboardState,
        mutation: LocalMutation,
    ) -> Result<Applied, HandlerError> {
        let registry = state.registry_mut();
        let changed = match mutation {
            LocalMutation::UpsertCustom(spec) => {
                registry.upsert_custom(&spec)?;
                true
            }
            LocalMutation::RenameCustom { old_ip, spec } => {
                registry.rename_custom(&old_ip, &spec)?;
                true
            }
            LocalMutation::RemoveCustom(ip) => registry.remove_custom(&ip)?,
            LocalMutation::SetEnabled { ip, enabled } => registry.set_enabled(&ip, enabled),
            LocalMutation::ReplaceCustomTargets(custom) => {
                registry.replace_custom(&custom);
                true
            }
        };
        Ok(Applied {
            changed,
            events: Vec::new(),
        })
    }

    fn notice(&self, level: NotificationLevel, message: String) -> SessionEvent {
        SessionEvent::Notify(Notification::new(level, message, self.notice_ttl))
    }
}

fn initial_targets(state: &mut DashboardState, initial: InitialTargets) -> Applied {
    state.registry_mut().replace_custom(&initial.custom_targets);
    info!(
        custom = state.registry().custom_count(),
        "target registry resynchronized"
    );
    Applied::changed()
}

fn label(name: &str, ip: &str) -> String {
    if name.trim().is_empty() {
        ip.to_string()
    } else {
        format!("{name} ({ip})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use netpulse_proto::{TargetEntry, GATEWAY, GOOGLE_DNS};

    fn reconciler() -> Reconciler {
        Reconciler::new(Duration::from_secs(3), Duration::from_secs(10))
    }

    fn state() -> DashboardState {
        DashboardState::new(100, 20)
    }

    #[test]
    fn rename_leaves_exactly_one_entry() {
        let r = reconciler();
        let mut state = state();
        r.apply(
            &mut state,
            ServerMessage::TargetAdded(TargetSpec::new("10.0.0.5", "NAS", true)),
        )
        .unwrap();

        let applied = r
            .apply(
                &mut state,
                ServerMessage::TargetUpdated(TargetUpdated {
                    ip: "10.0.0.6".into(),
                    old_ip: "10.0.0.5".into(),
                    name: "NAS".into(),
                    enabled: true,
                }),
            )
            .unwrap();

        assert!(applied.changed);
        let snapshot = state.snapshot();
        assert!(snapshot.target("10.0.0.5").is_none());
        assert!(snapshot.target("10.0.0.6").is_some());
        assert_eq!(snapshot.custom_targets().count(), 1);
    }

    #[test]
    fn removing_an_absent_target_changes_nothing() {
        let r = reconciler();
        let mut state = state();
        let before = state.snapshot();
        let applied = r
            .apply(
                &mut state,
                ServerMessage::TargetRemoved(TargetRemoved {
                    ip: "10.0.0.77".into(),
                }),
            )
            .unwrap();
        assert_eq!(applied, Applied::unchanged());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn initial_snapshot_then_remove_leaves_only_builtins() {
        let r = reconciler();
        let mut state = state();
        let mut custom = BTreeMap::new();
        custom.insert(
            "10.0.0.9".to_string(),
            TargetEntry {
                name: "Printer".into(),
                enabled: true,
            },
        );
        r.apply(
            &mut state,
            ServerMessage::InitialTargets(InitialTargets {
                custom_targets: custom,
            }),
        )
        .unwrap();
        r.apply(
            &mut state,
            ServerMessage::TargetRemoved(TargetRemoved {
                ip: "10.0.0.9".into(),
            }),
        )
        .unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.custom_targets().count(), 0);
        assert!(snapshot.target(GOOGLE_DNS).is_some());
        assert!(snapshot.target(GATEWAY).is_some());

        let err = r
            .apply(
                &mut state,
                ServerMessage::TargetRemoved(TargetRemoved { ip: GATEWAY.into() }),
            )
            .unwrap_err();
        assert_eq!(err, HandlerError::BuiltinTarget(GATEWAY.into()));
        assert!(state.snapshot().target(GATEWAY).is_some());
    }

    #[test]
    fn failure_report_alerts_and_marks_reports_stale_once() {
        let r = reconciler();
        let mut state = state();
        let applied = r
            .apply(
                &mut state,
                ServerMessage::FailureReport(FailureReport {
                    target: "10.0.0.5".into(),
                    target_name: "NAS".into(),
                    packets_lost: 12,
                    consecutive_failures: 12,
                    start_time: Utc::now(),
                }),
            )
            .unwrap();

        assert!(!applied.changed);
        let stale = applied
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ReportsStale))
            .count();
        assert_eq!(stale, 1);
        match &applied.events[0] {
            SessionEvent::Notify(notification) => {
                assert_eq!(notification.level, NotificationLevel::Alert);
                assert_eq!(notification.ttl, Duration::from_secs(10));
                assert_eq!(notification.message, "FAILURE DETECTED: NAS - 12 packets lost");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn crud_notices_use_the_default_ttl() {
        let r = reconciler();
        let mut state = state();
        let applied = r
            .apply(
                &mut state,
                ServerMessage::TargetAdded(TargetSpec::new("10.0.0.5", "NAS", true)),
            )
            .unwrap();
        assert_eq!(
            applied.events,
            vec![SessionEvent::Notify(Notification::new(
                NotificationLevel::Success,
                "Target added: NAS (10.0.0.5)",
                Duration::from_secs(3),
            ))]
        );

        let applied = r
            .apply(
                &mut state,
                ServerMessage::TargetUpdated(TargetUpdated {
                    old_ip: "10.0.0.5".into(),
                    ip: "10.0.0.5".into(),
                    name: "Backup NAS".into(),
                    enabled: false,
                }),
            )
            .unwrap();
        assert_eq!(
            applied.events,
            vec![SessionEvent::Notify(Notification::new(
                NotificationLevel::Success,
                "Target updated: Backup NAS (10.0.0.5)",
                Duration::from_secs(3),
            ))]
        );

        let applied = r
            .apply(
                &mut state,
                ServerMessage::TargetRemoved(TargetRemoved { ip: "10.0.0.5".into() }),
            )
            .unwrap();
        assert_eq!(
            applied.events,
            vec![SessionEvent::Notify(Notification::new(
                NotificationLevel::Info,
                "Target removed: 10.0.0.5",
                Duration::from_secs(3),
            ))]
        );
    }

    #[test]
    fn pong_and_unknown_are_no_ops() {
        let r = reconciler();
        let mut state = state();
        assert_eq!(r.apply(&mut state, ServerMessage::Pong).unwrap(), Applied::unchanged());
        assert_eq!(
            r.apply(&mut state, ServerMessage::Unknown("hello".into()))
                .unwrap(),
            Applied::unchanged()
        );
    }

    #[test]
    fn local_toggle_of_builtin_is_tracked() {
        let r = reconciler();
        let mut state = state();
        let applied = r
            .apply_local(
                &mut state,
                LocalMutation::SetEnabled {
                    ip: GOOGLE_DNS.into(),
                    enabled: false,
                },
            )
            .unwrap();
        assert!(applied.changed);
        assert!(!state.snapshot().target(GOOGLE_DNS).unwrap().enabled);
    }
}
