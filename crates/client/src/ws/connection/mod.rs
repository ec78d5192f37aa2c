//! Socket transport seam, reconnect policy and connection state.
//!
//! The connection manager only ever talks to a [`Connector`]; the production
//! implementation lives in `connection_native`.

use std::time::Duration;

use async_trait::async_trait;
use skillswap_shared::{ApiError, UNAUTHORIZED_CLOSE_CODES};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::api_client::ApiClient;

/// Connection state of the shared notification socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    Idle,
    Connecting,
    Open,
    /// Closed, waiting out a backoff (or post-refresh) delay before `attempt`.
    Reconnecting { attempt: u32 },
    /// Closed by the server as unauthorized; a session refresh is in flight.
    RefreshingSession,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Timing and recovery knobs for the shared connection
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Delay before the first reconnect after an ordinary close.
    pub backoff_base: Duration,
    /// Upper bound for any backoff delay.
    pub backoff_cap: Duration,
    /// Attempts beyond this exponent reuse the capped delay.
    pub max_backoff_exponent: u32,
    /// How long the socket outlives its last subscriber.
    pub grace_period: Duration,
    /// Fixed delay before reconnecting after a successful session refresh.
    pub auth_retry_delay: Duration,
    /// Bound on the socket handshake.
    pub connect_timeout: Duration,
    pub unauthorized_close_codes: Vec<u16>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_backoff_exponent: 5,
            grace_period: Duration::from_millis(300),
            auth_retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            unauthorized_close_codes: UNAUTHORIZED_CLOSE_CODES.to_vec(),
        }
    }
}

impl RealtimeConfig {
    /// Delay before reconnecting after `attempt` previous ordinary closes
    /// (`attempt` starts at 0): `min(cap, base * 2^attempt)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.max_backoff_exponent);
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.backoff_cap)
    }

    pub fn is_unauthorized(&self, close: &CloseInfo) -> bool {
        close
            .code
            .is_some_and(|code| self.unauthorized_close_codes.contains(&code))
    }
}

/// Why the transport closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// The transport went away without a close frame.
    pub fn abnormal() -> Self {
        Self {
            code: None,
            reason: "connection lost".to_string(),
        }
    }
}

/// Something that happened on an open socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Closed(CloseInfo),
}

/// Why a connection attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("server rejected the session")]
    Unauthorized,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handshake timed out")]
    Timeout,
}

/// Manager-side end of an open socket.
///
/// Dropping the link (or calling [`SocketLink::close`]) asks the transport to
/// close the socket.
#[derive(Debug)]
pub struct SocketLink {
    events: mpsc::UnboundedReceiver<SocketEvent>,
    close: Option<oneshot::Sender<()>>,
}

/// Transport-side end of an open socket
#[derive(Debug)]
pub struct LinkDriver {
    pub events: mpsc::UnboundedSender<SocketEvent>,
    /// Resolves when the manager closes or drops its [`SocketLink`].
    pub close_requested: oneshot::Receiver<()>,
}

impl SocketLink {
    pub fn channel() -> (SocketLink, LinkDriver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        (
            SocketLink {
                events: events_rx,
                close: Some(close_tx),
            },
            LinkDriver {
                events: events_tx,
                close_requested: close_rx,
            },
        )
    }

    /// Next event, or an abnormal close once the transport side is gone.
    pub async fn recv(&mut self) -> SocketEvent {
        self.events
            .recv()
            .await
            .unwrap_or_else(|| SocketEvent::Closed(CloseInfo::abnormal()))
    }

    pub fn close(mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Opens sockets to the notification endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<SocketLink, ConnectError>;
}

/// REST calls the connection manager needs while recovering a connection
#[async_trait]
pub trait RealtimeBackend: Send + Sync + 'static {
    async fn refresh_session(&self) -> Result<(), ApiError>;
    async fn fetch_unread_count(&self) -> Result<u64, ApiError>;
}

#[async_trait]
impl RealtimeBackend for ApiClient {
    async fn refresh_session(&self) -> Result<(), ApiError> {
        ApiClient::refresh_session(self).await
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        self.unread_count().await
    }
}

mod connection_native;
pub use connection_native::TungsteniteConnector;
