use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use netpulse_proto::ClientMessage;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::backoff::{Backoff, ReconnectPolicy};
use super::{ConnectionState, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Owns the one socket to the monitor backend.
///
/// A supervisor task dials, runs the heartbeat while connected and schedules
/// reconnects with exponential backoff. Every inbound text frame is forwarded,
/// in arrival order, to the `frames` channel handed to [`ConnectionManager::new`].
pub struct ConnectionManager {
    url: String,
    heartbeat: Duration,
    policy: ReconnectPolicy,
    frames: mpsc::UnboundedSender<String>,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    supervisor: Mutex<Option<Supervisor>>,
}

struct Supervisor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum ConnectionExit {
    Shutdown,
    Lost(TransportError),
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        heartbeat: Duration,
        policy: ReconnectPolicy,
        frames: mpsc::UnboundedSender<String>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            heartbeat: heartbeat.max(MIN_HEARTBEAT),
            policy,
            frames,
            state: Arc::new(state),
            attempts: Arc::new(AtomicU32::new(0)),
            supervisor: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start the supervisor. No-op while one is already connecting, connected
    /// or waiting to reconnect.
    ///
    /// A supervisor publishes `Disconnected` as its last act, so that state
    /// alone decides whether a fresh one is needed.
    pub fn connect(&self) {
        let mut slot = self.supervisor.lock();
        if slot.is_some() && self.state().is_active() {
            debug!(url = %self.url, "connect ignored; supervisor already running");
            return;
        }
        if let Some(stale) = slot.take() {
            stale.task.abort();
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let link = Link {
            url: self.url.clone(),
            heartbeat: self.heartbeat,
            frames: self.frames.clone(),
            state: self.state.clone(),
            attempts: self.attempts.clone(),
        };
        self.attempts.store(0, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connecting);
        let task = tokio::spawn(supervise(link, self.policy, shutdown_rx));
        *slot = Some(Supervisor { shutdown, task });
    }

    /// Tear down the socket and cancel heartbeat and reconnect timers. Safe to
    /// call repeatedly.
    pub async fn disconnect(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(Supervisor { shutdown, mut task }) = supervisor {
            let _ = shutdown.send(true);
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(url = %self.url, "supervisor did not stop in time; aborting");
                task.abort();
                let _ = task.await;
            }
            info!(url = %self.url, "disconnected");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.task.abort();
        }
    }
}

/// What the supervisor task needs from its manager.
struct Link {
    url: String,
    heartbeat: Duration,
    frames: mpsc::UnboundedSender<String>,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU32>,
}

impl Link {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(url = %self.url, state = %next, "connection state changed");
        }
    }
}

async fn supervise(link: Link, policy: ReconnectPolicy, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(policy);

    loop {
        link.set_state(ConnectionState::Connecting);
        let dial = tokio::select! {
            _ = shutdown.changed() => return,
            result = connect_async(link.url.as_str()) => result,
        };

        match dial {
            Ok((stream, _)) => {
                backoff.reset();
                link.attempts.store(0, Ordering::SeqCst);
                link.set_state(ConnectionState::Connected);
                match run_connection(stream, &link, &mut shutdown).await {
                    ConnectionExit::Shutdown => return,
                    ConnectionExit::Lost(err) => {
                        warn!(url = %link.url, error = %err, "connection lost");
                    }
                }
            }
            Err(source) => {
                let err = TransportError::Connect {
                    url: link.url.clone(),
                    source,
                };
                warn!(error = %err, "dial failed");
            }
        }

        let Some(delay) = backoff.next_delay() else {
            warn!(
                url = %link.url,
                attempts = backoff.attempt(),
                "reconnect attempts exhausted; staying disconnected"
            );
            link.set_state(ConnectionState::Disconnected);
            return;
        };
        link.attempts.store(backoff.attempt(), Ordering::SeqCst);
        link.set_state(ConnectionState::Reconnecting);
        info!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn run_connection(
    stream: WsStream,
    link: &Link,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionExit {
    let (mut sink, mut source) = stream.split();
    let mut heartbeat = interval_at(Instant::now() + link.heartbeat, link.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return ConnectionExit::Shutdown;
            }
            _ = heartbeat.tick() => {
                trace!(url = %link.url, "sending heartbeat");
                if let Err(err) = sink.send(Message::Text(ClientMessage::Ping.to_frame())).await {
                    return ConnectionExit::Lost(err.into());
                }
            }
            incoming = source.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(url = %link.url, "dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "server sent close");
                        return ConnectionExit::Lost(TransportError::Closed);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return ConnectionExit::Lost(err.into()),
                    None => return ConnectionExit::Lost(TransportError::Closed),
                };
                if link.frames.send(text).is_err() {
                    debug!("frame consumer gone; closing socket");
                    let _ = sink.send(Message::Close(None)).await;
                    link.set_state(ConnectionState::Disconnected);
                    return ConnectionExit::Shutdown;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(100),
            max_attempts: 2,
        }
    }

    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            "ws://127.0.0.1:9/ws",
            Duration::from_secs(30),
            ReconnectPolicy::default(),
            tx,
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn exhausted_retries_end_disconnected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            closed_port().await,
            Duration::from_secs(30),
            unreachable_policy(),
            tx,
        );
        let mut states = manager.subscribe();
        manager.connect();

        let mut saw_reconnecting = false;
        let outcome = timeout(Duration::from_secs(5), async {
            loop {
                if states.changed().await.is_err() {
                    break;
                }
                match *states.borrow_and_update() {
                    ConnectionState::Reconnecting => saw_reconnecting = true,
                    ConnectionState::Disconnected => break,
                    _ => {}
                }
            }
        })
        .await;

        assert!(outcome.is_ok(), "supervisor never gave up");
        assert!(saw_reconnecting);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_attempts(), 2);
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        };
        let manager = ConnectionManager::new(closed_port().await, Duration::from_secs(30), policy, tx);
        let mut states = manager.subscribe();
        manager.connect();

        timeout(
            Duration::from_secs(5),
            states.wait_for(|state| *state == ConnectionState::Reconnecting),
        )
        .await
        .expect("reached reconnecting")
        .expect("sender alive");

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_right_after_giving_up_starts_over() {
        let url = closed_port().await;
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(20),
            max_attempts: 1,
        };

        for round in 0..30 {
            let (tx, _rx) = mpsc::unbounded_channel();
            let manager = ConnectionManager::new(url.clone(), Duration::from_secs(30), policy, tx);
            let mut states = manager.subscribe();
            manager.connect();

            timeout(
                Duration::from_secs(5),
                states.wait_for(|state| *state == ConnectionState::Disconnected),
            )
            .await
            .expect("gave up")
            .expect("sender alive");

            // The old task may still be unwinding here.
            manager.connect();
            assert_ne!(
                manager.state(),
                ConnectionState::Disconnected,
                "connect ignored in round {round}"
            );
            manager.disconnect().await;
        }
    }

    #[tokio::test]
    async fn connect_while_active_keeps_the_running_supervisor() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        };
        let manager = ConnectionManager::new(closed_port().await, Duration::from_secs(30), policy, tx);
        let mut states = manager.subscribe();
        manager.connect();

        timeout(
            Duration::from_secs(5),
            states.wait_for(|state| *state == ConnectionState::Reconnecting),
        )
        .await
        .expect("reached reconnecting")
        .expect("sender alive");

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(manager.reconnect_attempts(), 1);
        manager.disconnect().await;
    }
}
