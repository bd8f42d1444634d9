//! The sync session: a single task that owns the [`DashboardState`] and
//! applies inputs one at a time, in arrival order.
//!
//! Two inputs feed it: text frames forwarded by the connection manager and
//! provisional [`LocalMutation`]s submitted through a [`StoreHandle`]. After
//! each input that changed the store a fresh [`DashboardSnapshot`] is
//! published, so readers only ever see fully applied transitions.

pub mod handlers;
pub mod message_router;

use std::collections::BTreeMap;
use std::sync::Arc;

use netpulse_proto::{TargetEntry, TargetSpec};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{HandlerError, StoreError};
use crate::notify::SessionEvent;
use crate::state::{DashboardSnapshot, DashboardState};

use handlers::{Applied, Reconciler};

const EVENT_CAPACITY: usize = 64;

/// Store transitions requested locally, typically right after a successful
/// command so the UI does not wait for the server echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMutation {
    UpsertCustom(TargetSpec),
    RenameCustom { old_ip: String, spec: TargetSpec },
    RemoveCustom(String),
    SetEnabled { ip: String, enabled: bool },
    ReplaceCustomTargets(BTreeMap<String, TargetEntry>),
}

struct LocalInput {
    mutation: LocalMutation,
    ack: oneshot::Sender<Result<(), HandlerError>>,
}

/// Cloneable access to the session's store.
#[derive(Clone)]
pub struct StoreHandle {
    local: mpsc::UnboundedSender<LocalInput>,
    snapshots: watch::Receiver<Arc<DashboardSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl StoreHandle {
    /// Apply `mutation` on the session task. Resolves once the resulting
    /// snapshot has been published.
    pub async fn apply(&self, mutation: LocalMutation) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.local
            .send(LocalInput { mutation, ack })
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)??;
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<DashboardSnapshot>> {
        self.snapshots.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Spawn the session task reading frames from `frames`.
pub fn spawn(
    config: &ClientConfig,
    frames: mpsc::UnboundedReceiver<String>,
) -> (StoreHandle, JoinHandle<()>) {
    let state = DashboardState::new(config.history_capacity, config.speed_window);
    let reconciler = Reconciler::new(config.notice_ttl, config.alert_ttl);
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(state.snapshot()));
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (local_tx, local_rx) = mpsc::unbounded_channel();

    let session = Session {
        state,
        reconciler,
        snapshots: snapshot_tx,
        events: events.clone(),
    };
    let task = tokio::spawn(session.run(frames, local_rx));
    let handle = StoreHandle {
        local: local_tx,
        snapshots: snapshot_rx,
        events,
    };
    (handle, task)
}

struct Session {
    state: DashboardState,
    reconciler: Reconciler,
    snapshots: watch::Sender<Arc<DashboardSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<String>,
        mut local: mpsc::UnboundedReceiver<LocalInput>,
    ) {
        let mut frames_open = true;
        let mut local_open = true;

        loop {
            tokio::select! {
                frame = frames.recv(), if frames_open => match frame {
                    Some(frame) => {
                        let applied =
                            message_router::route(&self.reconciler, &mut self.state, &frame);
                        self.commit(applied);
                    }
                    None => {
                        debug!("frame source closed");
                        frames_open = false;
                    }
                },
                input = local.recv(), if local_open => match input {
                    Some(LocalInput { mutation, ack }) => {
                        debug!(?mutation, "applying local mutation");
                        let result = match self.reconciler.apply_local(&mut self.state, mutation) {
                            Ok(applied) => {
                                self.commit(applied);
                                Ok(())
                            }
                            Err(err) => Err(err),
                        };
                        let _ = ack.send(result);
                    }
                    None => local_open = false,
                },
                else => break,
            }
        }
        info!("sync session stopped");
    }

    fn commit(&mut self, applied: Applied) {
        if applied.changed {
            self.state.mark_changed();
            self.snapshots.send_replace(Arc::new(self.state.snapshot()));
        }
        for event in applied.events {
            let _ = self.events.send(event);
        }
    }
}
