//! SkillSwap client
//!
//! Realtime skill-request notifications over a shared WebSocket, plus the
//! typed request lifecycle operations against the REST API.

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod requests;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use auth_session::AuthSession;
pub use config::ClientConfig;
pub use requests::RequestLifecycleClient;
pub use stores::{NotificationState, RequestsStore};
pub use ws::{ConnectionManager, Listeners, Subscription, SubscriptionEvent};
