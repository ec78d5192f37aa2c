//! Per-consumer lease on the shared notification connection.
//!
//! Acquiring a [`Subscription`] registers the consumer's listeners and bumps
//! the subscriber count; dropping it (or calling [`Subscription::release`])
//! undoes both. The socket itself outlives the last subscription by the
//! configured grace period, so a consumer that is torn down and immediately
//! re-created keeps the same socket.

use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use skillswap_shared::NotificationEvent;

use super::manager::ConnectionManager;
use super::store::{ListenerId, MessageListener, OpenListener};

/// Callbacks a consumer registers on the shared connection
#[derive(Clone, Default)]
pub struct Listeners {
    pub(crate) on_message: Option<MessageListener>,
    pub(crate) on_open: Option<OpenListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every payload pushed over the socket, in arrival order.
    pub fn on_message(
        mut self,
        listener: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(listener));
        self
    }

    /// Called after every successful (re)open. Consumers use it to re-fetch
    /// authoritative state, since messages sent while closed are lost.
    pub fn on_open(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(listener));
        self
    }
}

/// What a channel-backed subscription yields
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Opened,
    Message(NotificationEvent),
}

/// A lease on the shared connection; released on drop.
pub struct Subscription {
    manager: ConnectionManager,
    id: ListenerId,
}

impl Subscription {
    /// Register `listeners` and connect if nothing is live yet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn acquire(manager: &ConnectionManager, listeners: Listeners) -> Self {
        let id = ListenerId::new();
        manager.attach(id, listeners);
        Self {
            manager: manager.clone(),
            id,
        }
    }

    /// Acquire a subscription whose events are delivered through a channel.
    pub fn channel(manager: &ConnectionManager) -> (Self, UnboundedReceiver<SubscriptionEvent>) {
        let (tx, rx) = unbounded();
        let open_tx = tx.clone();
        let listeners = Listeners::new()
            .on_message(move |event: &NotificationEvent| {
                let _ = tx.unbounded_send(SubscriptionEvent::Message(event.clone()));
            })
            .on_open(move || {
                let _ = open_tx.unbounded_send(SubscriptionEvent::Opened);
            });
        (Self::acquire(manager, listeners), rx)
    }

    /// Release explicitly; equivalent to dropping the subscription.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.detach(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
