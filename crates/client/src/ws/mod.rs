//! Realtime notification socket shared by every consumer in the process.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ Subscription │ │ Subscription │ │ Subscription │
//! └──────────────┘ └──────────────┘ └──────────────┘
//!          │              │              │
//!          └──────────────┼──────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │  ConnectionManager  │──▶ NotificationState
//!              │  (one socket, one   │    (unread count)
//!              │   connection task)  │
//!              └─────────────────────┘
//!                         │
//!                         ▼
//!                 Connector (tungstenite)
//! ```
//!
//! Consumers never see the socket. They hold a [`Subscription`] whose
//! listeners receive every pushed payload, and read the unread count from
//! [`NotificationState`](crate::stores::NotificationState).
//!
//! ```rust,ignore
//! let sub = Subscription::acquire(
//!     &manager,
//!     Listeners::new()
//!         .on_message(|event: &NotificationEvent| tracing::info!(kind = %event.kind, "push"))
//!         .on_open(|| tracing::info!("socket open")),
//! );
//! // ...
//! drop(sub);
//! ```

mod connection;
mod manager;
mod store;
mod subscription;

pub use connection::{
    CloseInfo, ConnectError, ConnectionState, Connector, LinkDriver, RealtimeBackend,
    RealtimeConfig, SocketEvent, SocketLink, TungsteniteConnector,
};
pub use manager::ConnectionManager;
pub use store::{ConnectionStore, ListenerId, MessageListener, OpenListener};
pub use subscription::{Listeners, Subscription, SubscriptionEvent};
