//! Shared notification connection manager.
//!
//! One [`ConnectionManager`] is constructed at start-up and cloned into every
//! consumer. It owns at most one socket, shared by all [`Subscription`]s.
//! All connection state lives in a single background task; the public handle
//! only sends it commands, so there is exactly one writer.
//!
//! ```text
//! Idle ──attach──▶ Connecting ──ok──▶ Open ──close──▶ Reconnecting ──delay──▶ Connecting
//!                      │                  │
//!                      │ unauthorized     │ unauthorized close
//!                      ▼                  ▼
//!                RefreshingSession ──ok──▶ Reconnecting (fixed delay)
//!                      │
//!                      └──failed──▶ Idle (until the next attach)
//! ```
//!
//! [`Subscription`]: super::subscription::Subscription

use std::future::pending;
use std::sync::{Arc, Mutex};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use skillswap_shared::NotificationEvent;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::connection::{
    ConnectError, ConnectionState, Connector, RealtimeBackend, RealtimeConfig, SocketEvent,
    SocketLink,
};
use super::store::{ConnectionStore, ListenerId};
use super::subscription::Listeners;
use crate::stores::NotificationState;

enum Command {
    Attach { id: ListenerId, listeners: Listeners },
    Detach { id: ListenerId },
    Shutdown,
}

/// Completions of work the task spawned, tagged with the generation that
/// started them so results from a torn-down socket are dropped.
enum Internal {
    Connected {
        generation: u64,
        result: Result<SocketLink, ConnectError>,
    },
    Refreshed {
        generation: u64,
        ok: bool,
    },
}

/// Immutable pieces shared by the handle and the task.
struct Shared {
    url: String,
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    backend: Arc<dyn RealtimeBackend>,
    notifications: NotificationState,
    state: watch::Sender<ConnectionState>,
}

struct ManagerInner {
    shared: Arc<Shared>,
    commands: Mutex<Option<UnboundedSender<Command>>>,
}

/// Handle to the process-wide notification connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        backend: Arc<dyn RealtimeBackend>,
        notifications: NotificationState,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ManagerInner {
                shared: Arc::new(Shared {
                    url: url.into(),
                    config,
                    connector,
                    backend,
                    notifications,
                    state,
                }),
                commands: Mutex::new(None),
            }),
        }
    }

    pub fn notifications(&self) -> &NotificationState {
        &self.inner.shared.notifications
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.shared.config
    }

    /// Receiver that observes every connection state change
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.shared.state.borrow().clone()
    }

    /// Sender to the live connection task, starting a task with a fresh store
    /// if there is none. Never touches the network.
    fn get_or_create(&self) -> UnboundedSender<Command> {
        let mut commands = self
            .inner
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = commands.as_ref().filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }

        let (tx, rx) = unbounded();
        let task = ConnectionTask::new(self.inner.shared.clone());
        tokio::spawn(task.run(rx));
        tracing::debug!(url = %self.inner.shared.url, "connection store created");
        *commands = Some(tx.clone());
        tx
    }

    fn existing(&self) -> Option<UnboundedSender<Command>> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn attach(&self, id: ListenerId, listeners: Listeners) {
        if self
            .get_or_create()
            .unbounded_send(Command::Attach { id, listeners })
            .is_err()
        {
            tracing::warn!("connection task stopped before attach");
        }
    }

    pub(crate) fn detach(&self, id: ListenerId) {
        if let Some(tx) = self.existing() {
            let _ = tx.unbounded_send(Command::Detach { id });
        }
    }

    /// Close the socket and stop the connection task. A later attach starts
    /// over with a fresh store.
    pub fn shutdown(&self) {
        let tx = self
            .inner
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.unbounded_send(Command::Shutdown);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.shared.url)
            .field("state", &self.current_state())
            .finish()
    }
}

/// Owner of the socket, its retry counter and the subscriber set.
struct ConnectionTask {
    shared: Arc<Shared>,
    store: ConnectionStore,
    state: ConnectionState,
    /// Bumped on every connect attempt and teardown.
    generation: u64,
    connect_at: Option<Instant>,
    teardown_at: Option<Instant>,
    /// Set when a refresh ran since the last successful open; a second
    /// unauthorized close in that window goes idle instead of looping.
    refreshed_since_open: bool,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl ConnectionTask {
    fn new(shared: Arc<Shared>) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            shared,
            store: ConnectionStore::new(),
            state: ConnectionState::Idle,
            generation: 0,
            connect_at: None,
            teardown_at: None,
            refreshed_since_open: false,
            internal_tx,
            internal_rx,
        }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = commands.next() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                event = next_socket_event(&mut self.store.socket) => {
                    self.handle_socket_event(event)
                }
                _ = wait_until(self.connect_at) => {
                    self.connect_at = None;
                    self.start_connect();
                }
                _ = wait_until(self.teardown_at) => {
                    self.teardown_at = None;
                    if self.store.subscriber_count() == 0 {
                        self.teardown();
                    }
                }
            }
        }
        self.teardown();
        tracing::debug!("connection task stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "notification socket state");
        }
        self.state = state.clone();
        self.shared.state.send_replace(state);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach { id, listeners } => {
                if let Some(listener) = listeners.on_message {
                    self.store.add_message_listener(id, listener);
                }
                if let Some(listener) = listeners.on_open {
                    self.store.add_open_listener(id, listener);
                }
                let count = self.store.increment_ref_count(id);
                if self.teardown_at.take().is_some() {
                    tracing::debug!("pending teardown cancelled by new subscriber");
                }
                tracing::debug!(subscribers = count, "subscriber attached");

                if self.state == ConnectionState::Idle && self.connect_at.is_none() {
                    self.refreshed_since_open = false;
                    // Deferred to the next loop turn so attach/release/attach
                    // bursts already queued collapse into a single socket.
                    self.connect_at = Some(Instant::now());
                }
            }
            Command::Detach { id } => {
                let Some(remaining) = self.store.decrement_ref_count(id) else {
                    tracing::debug!(?id, "ignoring release of a subscriber this store never saw");
                    return;
                };
                self.store.remove_message_listener(id);
                self.store.remove_open_listener(id);
                tracing::debug!(subscribers = remaining, "subscriber released");
                if remaining == 0 {
                    self.teardown_at = Some(Instant::now() + self.shared.config.grace_period);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            tracing::debug!("connect requested while already connecting or open");
            return;
        }
        if self.store.subscriber_count() == 0 {
            self.set_state(ConnectionState::Idle);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);

        let shared = self.shared.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(
                shared.config.connect_timeout,
                shared.connector.connect(&shared.url),
            )
            .await
            .unwrap_or(Err(ConnectError::Timeout));
            let _ = internal.send(Internal::Connected { generation, result });
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Connected { generation, result } => {
                if generation != self.generation {
                    if let Ok(link) = result {
                        tracing::debug!("closing socket that opened after teardown");
                        link.close();
                    }
                    return;
                }
                match result {
                    Ok(link) => self.on_open(link),
                    Err(ConnectError::Unauthorized) => self.on_unauthorized(),
                    Err(e) => {
                        tracing::debug!(error = %e, "notification socket connect failed");
                        self.on_ordinary_close();
                    }
                }
            }
            Internal::Refreshed { generation, ok } => {
                if generation != self.generation {
                    return;
                }
                if ok {
                    self.connect_at = Some(Instant::now() + self.shared.config.auth_retry_delay);
                    self.set_state(ConnectionState::Reconnecting {
                        attempt: self.store.retry_attempt() + 1,
                    });
                } else {
                    tracing::info!("session refresh failed; notification socket stays idle");
                    self.set_state(ConnectionState::Idle);
                }
            }
        }
    }

    fn on_open(&mut self, link: SocketLink) {
        self.store.socket = Some(link);
        self.store.reset_retry_attempt();
        self.refreshed_since_open = false;
        self.set_state(ConnectionState::Open);
        tracing::info!(url = %self.shared.url, "notification socket open");

        self.store.dispatch_open();

        let notifications = self.shared.notifications.clone();
        let backend = self.shared.backend.clone();
        tokio::spawn(async move {
            notifications.refresh_unread_count(backend.as_ref()).await;
        });
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Text(text) => match NotificationEvent::parse(&text) {
                Ok(event) => {
                    self.shared.notifications.apply_event(&event);
                    self.store.dispatch_message(&event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed notification payload");
                }
            },
            SocketEvent::Closed(close) => {
                self.store.socket = None;
                tracing::debug!(
                    code = ?close.code,
                    reason = %close.reason,
                    "notification socket closed"
                );
                if self.shared.config.is_unauthorized(&close) {
                    self.on_unauthorized();
                } else {
                    self.on_ordinary_close();
                }
            }
        }
    }

    fn on_ordinary_close(&mut self) {
        if self.store.subscriber_count() == 0 {
            self.set_state(ConnectionState::Idle);
            return;
        }
        let attempt = self.store.take_retry_attempt();
        let delay = self.shared.config.delay_for_attempt(attempt);
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "scheduling reconnect"
        );
        self.connect_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting {
            attempt: attempt + 1,
        });
    }

    fn on_unauthorized(&mut self) {
        if self.store.subscriber_count() == 0 {
            self.set_state(ConnectionState::Idle);
            return;
        }
        if self.refreshed_since_open {
            tracing::info!(
                "still unauthorized after a session refresh; notification socket stays idle"
            );
            self.set_state(ConnectionState::Idle);
            return;
        }
        self.refreshed_since_open = true;
        self.set_state(ConnectionState::RefreshingSession);

        let generation = self.generation;
        let backend = self.shared.backend.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let ok = match backend.refresh_session().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "session refresh rejected");
                    false
                }
            };
            let _ = internal.send(Internal::Refreshed { generation, ok });
        });
    }

    /// Manager-initiated close: no reconnect follows.
    fn teardown(&mut self) {
        self.generation += 1;
        self.connect_at = None;
        self.teardown_at = None;
        if let Some(link) = self.store.socket.take() {
            tracing::info!("closing notification socket with no subscribers");
            link.close();
        }
        self.store.reset_retry_attempt();
        self.set_state(ConnectionState::Idle);
    }
}

async fn next_socket_event(socket: &mut Option<SocketLink>) -> SocketEvent {
    match socket {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
