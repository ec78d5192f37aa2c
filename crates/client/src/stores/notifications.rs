//! Unread skill-request notification count.
//!
//! The count mirrors the last value the server reported, either pushed over
//! the socket or returned by the unread-count endpoint. The client never
//! adjusts it speculatively; the only local write is zeroing it after the
//! server acknowledges "mark all read".

use std::sync::{Arc, Mutex, MutexGuard};

use skillswap_shared::{ApiError, NotificationEvent};
use tokio::sync::watch;

use crate::api_client::ApiClient;
use crate::ws::RealtimeBackend;

#[derive(Clone, Debug)]
pub struct NotificationState {
    count: Arc<watch::Sender<u64>>,
    /// Bumped by every socket push and acknowledgment, so a slower REST read
    /// never overwrites a newer pushed value. Held across the compare and the
    /// write so neither can interleave with a push.
    revision: Arc<Mutex<u64>>,
}

impl NotificationState {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
            revision: Arc::new(Mutex::new(0)),
        }
    }

    pub fn unread_count(&self) -> u64 {
        *self.count.borrow()
    }

    /// Receiver that observes every change of the unread count
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.count.subscribe()
    }

    fn revision(&self) -> MutexGuard<'_, u64> {
        self.revision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, count: u64) {
        let mut revision = self.revision();
        *revision += 1;
        self.count.send_replace(count);
    }

    /// Apply a socket payload. Only `skill_request` payloads carrying a count
    /// change state; later payloads always overwrite earlier ones.
    pub fn apply_event(&self, event: &NotificationEvent) -> bool {
        match (event.is_skill_request(), event.unread_count) {
            (true, Some(count)) => {
                self.write(count);
                true
            }
            _ => false,
        }
    }

    /// Re-read the count from the server. Failures leave the current value in
    /// place and return `None`.
    pub async fn refresh_unread_count<B>(&self, backend: &B) -> Option<u64>
    where
        B: RealtimeBackend + ?Sized,
    {
        let seen = *self.revision();
        match backend.fetch_unread_count().await {
            Ok(count) => {
                let revision = self.revision();
                if *revision == seen {
                    self.count.send_replace(count);
                } else {
                    tracing::debug!(count, "discarding unread count older than a pushed value");
                }
                let current = *self.count.borrow();
                drop(revision);
                Some(current)
            }
            Err(e) => {
                tracing::debug!(error = %e, "unread count refresh failed");
                None
            }
        }
    }

    /// Acknowledge every skill-request notification, zeroing the count once
    /// the server confirms.
    pub async fn mark_all_read(&self, api: &ApiClient) -> Result<(), ApiError> {
        api.mark_all_read().await?;
        self.write(0);
        Ok(())
    }
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn push(count: u64) -> NotificationEvent {
        NotificationEvent::parse(&format!(
            r#"{{"type":"skill_request","unread_count":{count}}}"#
        ))
        .unwrap()
    }

    struct FixedBackend(Result<u64, ApiError>);

    #[async_trait]
    impl RealtimeBackend for FixedBackend {
        async fn refresh_session(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
            self.0.clone()
        }
    }

    #[test]
    fn later_push_wins() {
        let state = NotificationState::new();
        assert!(state.apply_event(&push(9)));
        assert!(state.apply_event(&push(2)));
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn other_types_and_countless_pushes_are_ignored() {
        let state = NotificationState::new();
        state.apply_event(&push(3));
        let other = NotificationEvent::parse(r#"{"type":"review","unread_count":50}"#).unwrap();
        assert!(!state.apply_event(&other));
        let countless = NotificationEvent::parse(r#"{"type":"skill_request"}"#).unwrap();
        assert!(!state.apply_event(&countless));
        assert_eq!(state.unread_count(), 3);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_value() {
        let state = NotificationState::new();
        state.apply_event(&push(4));
        let failing = FixedBackend(Err(ApiError::Network("down".into())));
        assert_eq!(state.refresh_unread_count(&failing).await, None);
        assert_eq!(state.unread_count(), 4);

        let ok = FixedBackend(Ok(6));
        assert_eq!(state.refresh_unread_count(&ok).await, Some(6));
        assert_eq!(state.unread_count(), 6);
    }

    /// Holds the fetch open until released, so a push can land mid-request.
    struct GatedBackend {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl RealtimeBackend for GatedBackend {
        async fn refresh_session(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
            self.gate.notified().await;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn push_during_refresh_is_not_overwritten() {
        let state = NotificationState::new();
        let gate = Arc::new(Notify::new());
        let backend = GatedBackend { gate: gate.clone() };

        let refreshing = {
            let state = state.clone();
            tokio::spawn(async move { state.refresh_unread_count(&backend).await })
        };
        tokio::task::yield_now().await;
        state.apply_event(&push(8));
        gate.notify_one();

        assert_eq!(refreshing.await.unwrap(), Some(8));
        assert_eq!(state.unread_count(), 8);
    }

    /// Signals once the fetch is in flight, then waits for the gate.
    struct SignallingBackend {
        entered: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl RealtimeBackend for SignallingBackend {
        async fn refresh_session(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(1)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refresh_racing_pushes_never_ends_on_the_rest_value() {
        for _ in 0..50 {
            let state = NotificationState::new();
            let entered = Arc::new(Notify::new());
            let gate = Arc::new(Notify::new());
            let backend = SignallingBackend {
                entered: entered.clone(),
                gate: gate.clone(),
            };

            let refreshing = {
                let state = state.clone();
                tokio::spawn(async move { state.refresh_unread_count(&backend).await })
            };
            entered.notified().await;
            let pusher = {
                let state = state.clone();
                std::thread::spawn(move || {
                    for count in 2..=200 {
                        state.apply_event(&push(count));
                    }
                })
            };
            gate.notify_one();

            refreshing.await.unwrap();
            pusher.join().unwrap();
            assert_eq!(state.unread_count(), 200);
        }
    }

    #[test]
    fn subscribers_see_changes() {
        let state = NotificationState::new();
        let mut rx = state.subscribe();
        state.apply_event(&push(5));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 5);
    }
}
