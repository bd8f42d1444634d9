use std::sync::Arc;

use netpulse_proto::{
    CommandAck, GenerateReportResponse, ReportsResponse, StatusResponse, TargetSpec,
    TargetsResponse,
};
use netpulse_sdk::{validation, CommandError, MonitorClient};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::ClientConfig;
use crate::notify::SessionEvent;
use crate::session::{self, LocalMutation, StoreHandle};
use crate::state::DashboardSnapshot;
use crate::transport::{ConnectionManager, ConnectionState};

/// Everything a dashboard needs: the live connection, the synchronized store
/// and the command channel.
///
/// Commands never assume their own success reached the store. The matching
/// pushed event does that. With `optimistic_updates` enabled a provisional
/// transition is applied as soon as the server acknowledges, and the later
/// echo lands as an idempotent re-application.
pub struct DashboardClient {
    config: ClientConfig,
    connection: ConnectionManager,
    store: StoreHandle,
    commands: MonitorClient,
    session: JoinHandle<()>,
    state_relay: JoinHandle<()>,
}

impl DashboardClient {
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, CommandError> {
        let commands = MonitorClient::new(&config.api_base())?;
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(
            config.ws_url(),
            config.heartbeat_interval,
            config.reconnect,
            frames_tx,
        );
        let (store, session) = session::spawn(&config, frames_rx);
        let state_relay = tokio::spawn(relay_connection_state(connection.subscribe(), store.clone()));

        Ok(Self {
            config,
            connection,
            store,
            commands,
            session,
            state_relay,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.store.snapshot()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe_events()
    }

    pub fn commands(&self) -> &MonitorClient {
        &self.commands
    }

    pub async fn status(&self) -> Result<StatusResponse, CommandError> {
        self.commands.status().await
    }

    pub async fn add_target(&self, spec: TargetSpec) -> Result<CommandAck, CommandError> {
        let spec = validation::validate_spec(&spec)?;
        let ack = self.commands.add_target(&spec).await?;
        self.provisional(LocalMutation::UpsertCustom(spec)).await;
        Ok(ack)
    }

    /// Update the target stored under `old_ip`; `spec.ip` may be a new key.
    pub async fn update_target(
        &self,
        old_ip: &str,
        spec: TargetSpec,
    ) -> Result<CommandAck, CommandError> {
        let spec = validation::validate_spec(&spec)?;
        let ack = self.commands.update_target(old_ip, &spec).await?;
        self.provisional(LocalMutation::RenameCustom {
            old_ip: old_ip.trim().to_string(),
            spec,
        })
        .await;
        Ok(ack)
    }

    pub async fn remove_target(&self, ip: &str) -> Result<CommandAck, CommandError> {
        let ack = self.commands.remove_target(ip).await?;
        self.provisional(LocalMutation::RemoveCustom(ip.trim().to_string()))
            .await;
        Ok(ack)
    }

    pub async fn toggle_target(&self, ip: &str, enabled: bool) -> Result<CommandAck, CommandError> {
        let ack = self.commands.toggle_target(ip, enabled).await?;
        self.provisional(LocalMutation::SetEnabled {
            ip: ip.trim().to_string(),
            enabled,
        })
        .await;
        Ok(ack)
    }

    pub async fn generate_report(&self) -> Result<GenerateReportResponse, CommandError> {
        self.commands.generate_report().await
    }

    pub async fn list_reports(&self) -> Result<ReportsResponse, CommandError> {
        self.commands.list_reports().await
    }

    /// Seed the registry from `GET /api/targets`. Same full-replace semantics
    /// as an `initial_targets` push.
    pub async fn refresh_targets(&self) -> Result<TargetsResponse, CommandError> {
        let targets = self.commands.targets().await?;
        if let Err(err) = self
            .store
            .apply(LocalMutation::ReplaceCustomTargets(targets.custom_targets.clone()))
            .await
        {
            warn!(error = %err, "could not seed target registry");
        }
        Ok(targets)
    }

    async fn provisional(&self, mutation: LocalMutation) {
        if !self.config.optimistic_updates {
            return;
        }
        if let Err(err) = self.store.apply(mutation).await {
            warn!(error = %err, "provisional update not applied");
        }
    }
}

impl Drop for DashboardClient {
    fn drop(&mut self) {
        self.state_relay.abort();
        self.session.abort();
    }
}

async fn relay_connection_state(mut states: watch::Receiver<ConnectionState>, store: StoreHandle) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        store.emit(SessionEvent::Connection(state));
    }
}
