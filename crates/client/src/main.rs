//! skillswap-watch: follow skill-request notifications for one signed-in user.
//!
//! Lists the user's requests once, then logs every pushed notification and
//! unread-count change until interrupted.

use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use skillswap_client::ws::{
    ConnectionManager, Subscription, SubscriptionEvent, TungsteniteConnector,
};
use skillswap_client::{ClientConfig, NotificationState, RequestLifecycleClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("skillswap_client=debug,skillswap_watch=debug")),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let session = config.session()?;
    let api = session.client(config.http_timeout)?;
    let ws_url = config.socket_url(&session);

    let requests = RequestLifecycleClient::new(api.clone(), session.user_id());
    match requests.list(&[]).await {
        Some(list) => tracing::info!(
            received = list.received.len(),
            sent = list.sent.len(),
            "loaded skill requests"
        ),
        None => tracing::warn!("could not load skill requests; continuing with notifications only"),
    }

    let cookie_session = session.clone();
    let connector =
        TungsteniteConnector::new().with_cookie_source(move || cookie_session.cookie_header());
    let notifications = NotificationState::new();
    let manager = ConnectionManager::new(
        ws_url,
        config.realtime.clone(),
        Arc::new(connector),
        Arc::new(api),
        notifications.clone(),
    );

    let mut unread = notifications.subscribe();
    let mut state = manager.state();
    let (subscription, mut events) = Subscription::channel(&manager);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::info!("interrupted");
                break;
            }
            Some(event) = events.next() => match event {
                SubscriptionEvent::Opened => {
                    // Pushes sent while disconnected are lost; re-pull the list.
                    requests.list(&[]).await;
                }
                SubscriptionEvent::Message(event) => {
                    tracing::info!(kind = %event.kind, payload = %event.payload, "notification");
                    if event.is_skill_request() {
                        requests.list(&[]).await;
                    }
                }
            },
            Ok(()) = unread.changed() => {
                let count = *unread.borrow_and_update();
                tracing::info!(count, "unread skill-request notifications");
            }
            Ok(()) = state.changed() => {
                let current = state.borrow_and_update().clone();
                tracing::debug!(state = ?current, "connection state");
            }
        }
    }

    subscription.release();
    manager.shutdown();
    Ok(())
}
