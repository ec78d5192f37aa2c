//! Bookkeeping for the shared connection: the live socket, subscriber count,
//! retry counter and listener registries.
//!
//! The store performs no I/O. It is owned by the connection task and only that
//! task mutates it.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use skillswap_shared::NotificationEvent;
use uuid::Uuid;

use super::connection::SocketLink;

/// Called with every payload received on the socket
pub type MessageListener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// Called once per successful socket open
pub type OpenListener = Arc<dyn Fn() + Send + Sync>;

/// Identity of one consumer's listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct ConnectionStore {
    pub(crate) socket: Option<SocketLink>,
    subscribers: HashSet<ListenerId>,
    retry_attempt: u32,
    message_listeners: HashMap<ListenerId, MessageListener>,
    open_listeners: HashMap<ListenerId, OpenListener>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message_listener(&mut self, id: ListenerId, listener: MessageListener) {
        self.message_listeners.insert(id, listener);
    }

    pub fn remove_message_listener(&mut self, id: ListenerId) -> bool {
        self.message_listeners.remove(&id).is_some()
    }

    pub fn add_open_listener(&mut self, id: ListenerId, listener: OpenListener) {
        self.open_listeners.insert(id, listener);
    }

    pub fn remove_open_listener(&mut self, id: ListenerId) -> bool {
        self.open_listeners.remove(&id).is_some()
    }

    pub fn increment_ref_count(&mut self, id: ListenerId) -> usize {
        self.subscribers.insert(id);
        self.subscribers.len()
    }

    /// Returns the remaining count, or `None` when `id` was never attached
    /// to this store. Reaching zero only makes the socket eligible for
    /// teardown; the caller schedules it.
    pub fn decrement_ref_count(&mut self, id: ListenerId) -> Option<usize> {
        self.subscribers
            .remove(&id)
            .then(|| self.subscribers.len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Current attempt number, then advance it for the next close.
    pub fn take_retry_attempt(&mut self) -> u32 {
        let attempt = self.retry_attempt;
        self.retry_attempt = self.retry_attempt.saturating_add(1);
        attempt
    }

    pub fn reset_retry_attempt(&mut self) {
        self.retry_attempt = 0;
    }

    /// Deliver `event` to every registered message listener. A panicking
    /// listener is logged and skipped. Returns how many listeners panicked.
    pub fn dispatch_message(&self, event: &NotificationEvent) -> usize {
        let mut panicked = 0;
        for listener in self.message_listeners.values() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(kind = %event.kind, "message listener panicked");
                panicked += 1;
            }
        }
        panicked
    }

    /// Notify every open listener. Same isolation rules as [`Self::dispatch_message`].
    pub fn dispatch_open(&self) -> usize {
        let mut panicked = 0;
        for listener in self.open_listeners.values() {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::error!("open listener panicked");
                panicked += 1;
            }
        }
        panicked
    }
}
