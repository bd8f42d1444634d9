//! Single source of truth for the dashboard: ping history, throughput and the
//! target registry. Only the sync session mutates a [`DashboardState`]; readers
//! get immutable [`DashboardSnapshot`]s.

pub mod registry;
pub mod ring;

use std::collections::BTreeMap;
use std::sync::Arc;

use netpulse_proto::{NetworkSpeedSample, PingResult, Target};
use serde::Serialize;

use crate::error::HandlerError;
pub use registry::TargetRegistry;
pub use ring::BoundedBuffer;

/// Collections are held behind `Arc` and shared with published snapshots.
/// A mutation copies a collection only while a snapshot still holds it, so a
/// ping frame never copies the registry or the throughput window.
#[derive(Debug, Clone)]
pub struct DashboardState {
    history: Arc<BoundedBuffer<PingResult>>,
    statuses: Arc<BTreeMap<String, PingResult>>,
    current_speed: Option<NetworkSpeedSample>,
    speed_window: Arc<BoundedBuffer<NetworkSpeedSample>>,
    registry: Arc<TargetRegistry>,
    ping_stats: PingStats,
    revision: u64,
}

impl DashboardState {
    pub fn new(history_capacity: usize, speed_window: usize) -> Self {
        Self {
            history: Arc::new(BoundedBuffer::new(history_capacity)),
            statuses: Arc::new(BTreeMap::new()),
            current_speed: None,
            speed_window: Arc::new(BoundedBuffer::new(speed_window)),
            registry: Arc::new(TargetRegistry::default()),
            ping_stats: PingStats::default(),
            revision: 0,
        }
    }

    /// Append to history and make `result` the current status of its target.
    /// Arrival order wins; embedded timestamps are not compared.
    pub fn apply_ping_result(&mut self, mut result: PingResult) -> Result<(), HandlerError> {
        if result.target.trim().is_empty() {
            return Err(HandlerError::InvalidPayload("ping result without target".into()));
        }
        if !result.success {
            result.latency = None;
        } else if let Some(latency) = result.latency {
            if !latency.is_finite() || latency < 0.0 {
                return Err(HandlerError::InvalidPayload(format!(
                    "latency {latency} for {}",
                    result.target
                )));
            }
        }
        Arc::make_mut(&mut self.statuses).insert(result.target.clone(), result.clone());
        Arc::make_mut(&mut self.history).push(result);
        self.ping_stats = PingStats::from_history(self.history.iter());
        Ok(())
    }

    pub fn apply_network_speed(&mut self, sample: NetworkSpeedSample) -> Result<(), HandlerError> {
        let valid = |mbps: f64| mbps.is_finite() && mbps >= 0.0;
        if !valid(sample.download_mbps) || !valid(sample.upload_mbps) {
            return Err(HandlerError::InvalidPayload(format!(
                "throughput {}/{} Mbps",
                sample.download_mbps, sample.upload_mbps
            )));
        }
        Arc::make_mut(&mut self.speed_window).push(sample.clone());
        self.current_speed = Some(sample);
        Ok(())
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TargetRegistry {
        Arc::make_mut(&mut self.registry)
    }

    pub fn history(&self) -> &BoundedBuffer<PingResult> {
        &self.history
    }

    pub fn current_speed(&self) -> Option<&NetworkSpeedSample> {
        self.current_speed.as_ref()
    }

    pub(crate) fn mark_changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            revision: self.revision,
            history: Arc::clone(&self.history),
            statuses: Arc::clone(&self.statuses),
            current_speed: self.current_speed.clone(),
            speed_window: Arc::clone(&self.speed_window),
            targets: Arc::clone(&self.registry),
            ping_stats: self.ping_stats,
        }
    }
}

/// Immutable view published after every applied input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub revision: u64,
    /// Oldest first.
    pub history: Arc<BoundedBuffer<PingResult>>,
    pub statuses: Arc<BTreeMap<String, PingResult>>,
    pub current_speed: Option<NetworkSpeedSample>,
    pub speed_window: Arc<BoundedBuffer<NetworkSpeedSample>>,
    pub targets: Arc<TargetRegistry>,
    pub ping_stats: PingStats,
}

impl DashboardSnapshot {
    pub fn target(&self, key: &str) -> Option<&Target> {
        self.targets.get(key)
    }

    pub fn custom_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.is_custom())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PingStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Mean over successful pings that reported a latency.
    pub average_latency: Option<f64>,
}

impl PingStats {
    pub fn from_history<'a>(results: impl IntoIterator<Item = &'a PingResult>) -> Self {
        let mut stats = PingStats::default();
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;
        for result in results {
            stats.total += 1;
            if result.success {
                stats.successful += 1;
                if let Some(latency) = result.latency {
                    latency_sum += latency;
                    latency_count += 1;
                }
            } else {
                stats.failed += 1;
            }
        }
        if latency_count > 0 {
            stats.average_latency = Some(latency_sum / latency_count as f64);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netpulse_proto::TargetSpec;

    fn ping(target: &str, success: bool, latency: Option<f64>) -> PingResult {
        PingResult {
            target: target.into(),
            success,
            latency,
            timestamp: Utc::now(),
            error: None,
        }
    }

    fn speed(download: f64) -> NetworkSpeedSample {
        NetworkSpeedSample {
            download_mbps: download,
            upload_mbps: download / 10.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn history_keeps_the_last_n_in_arrival_order() {
        let mut state = DashboardState::new(100, 20);
        for n in 0..250 {
            state
                .apply_ping_result(ping("8.8.8.8", true, Some(n as f64)))
                .unwrap();
            assert!(state.history().len() <= 100);
        }
        let latencies: Vec<f64> = state
            .snapshot()
            .history
            .iter()
            .filter_map(|p| p.latency)
            .collect();
        let expected: Vec<f64> = (150..250).map(|n| n as f64).collect();
        assert_eq!(latencies, expected);
    }

    #[test]
    fn status_is_last_arrival_not_latest_timestamp() {
        let mut state = DashboardState::new(10, 5);
        let newer = ping("gateway", true, Some(1.0));
        let mut older = ping("gateway", false, None);
        older.timestamp = newer.timestamp - chrono::Duration::seconds(60);

        state.apply_ping_result(newer).unwrap();
        state.apply_ping_result(older).unwrap();

        assert!(!state.snapshot().statuses["gateway"].success);
    }

    #[test]
    fn failed_pings_lose_their_latency() {
        let mut state = DashboardState::new(10, 5);
        state
            .apply_ping_result(ping("10.0.0.1", false, Some(0.0)))
            .unwrap();
        assert_eq!(state.snapshot().history.latest().unwrap().latency, None);
    }

    #[test]
    fn negative_latency_is_rejected() {
        let mut state = DashboardState::new(10, 5);
        let err = state
            .apply_ping_result(ping("10.0.0.1", true, Some(-3.0)))
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload(_)));
        assert!(state.history().is_empty());
    }

    #[test]
    fn speed_window_trails_current_sample() {
        let mut state = DashboardState::new(10, 20);
        for n in 1..=6 {
            state.apply_network_speed(speed(n as f64 * 10.0)).unwrap();
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.speed_window.len(), 6);
        assert_eq!(
            snapshot.current_speed.map(|s| s.download_mbps),
            Some(60.0)
        );
        let downloads: Vec<f64> = snapshot.speed_window.iter().map(|s| s.download_mbps).collect();
        assert_eq!(downloads, vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn ping_stats_average_successful_latencies() {
        let mut state = DashboardState::new(10, 5);
        state.apply_ping_result(ping("a", true, Some(10.0))).unwrap();
        state.apply_ping_result(ping("a", true, Some(30.0))).unwrap();
        state.apply_ping_result(ping("b", false, None)).unwrap();

        let stats = state.snapshot().ping_stats;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_latency, Some(20.0));
    }

    #[test]
    fn pings_share_the_untouched_collections() {
        let mut state = DashboardState::new(10, 5);
        state.apply_network_speed(speed(50.0)).unwrap();
        let before = state.snapshot();

        state.apply_ping_result(ping("gateway", true, Some(2.0))).unwrap();
        let after = state.snapshot();

        assert!(Arc::ptr_eq(&before.targets, &after.targets));
        assert!(Arc::ptr_eq(&before.speed_window, &after.speed_window));
        assert!(!Arc::ptr_eq(&before.history, &after.history));
        assert!(before.history.is_empty());
        assert_eq!(after.history.len(), 1);
    }

    #[test]
    fn registry_edits_leave_published_snapshots_alone() {
        let mut state = DashboardState::new(10, 5);
        let before = state.snapshot();

        state
            .registry_mut()
            .upsert_custom(&TargetSpec::new("10.0.0.5", "NAS", true))
            .unwrap();
        let after = state.snapshot();

        assert!(before.target("10.0.0.5").is_none());
        assert!(after.target("10.0.0.5").is_some());
        assert!(Arc::ptr_eq(&before.history, &after.history));
    }
}
