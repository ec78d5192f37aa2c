//! Cached view of the signed-in user's skill requests.
//!
//! The store is a read-only projection of server responses: items are only
//! ever replaced by a resource the server returned, never patched locally.
//! The one local edit is dropping an item the viewer hid.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use skillswap_shared::{Party, RequestId, RequestList, SkillRequest, UserId};

/// What [`RequestsStore::apply`] did with a server resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Replaced the cached item with the same id.
    Replaced,
    /// Not cached yet; added to the viewer's partition.
    Inserted,
    /// Older than the cached copy; dropped.
    Stale,
    /// The viewer is neither requester nor recipient.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RequestsStore {
    viewer: UserId,
    list: Arc<RwLock<RequestList>>,
}

impl RequestsStore {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            list: Arc::new(RwLock::new(RequestList::default())),
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    fn read(&self) -> RwLockReadGuard<'_, RequestList> {
        self.list.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RequestList> {
        self.list.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace everything with a fresh list response.
    pub fn replace_all(&self, list: RequestList) {
        *self.write() = list;
    }

    pub fn snapshot(&self) -> RequestList {
        self.read().clone()
    }

    pub fn received(&self) -> Vec<SkillRequest> {
        self.read().received.clone()
    }

    pub fn sent(&self) -> Vec<SkillRequest> {
        self.read().sent.clone()
    }

    pub fn get(&self, id: RequestId) -> Option<SkillRequest> {
        let list = self.read();
        list.received
            .iter()
            .chain(list.sent.iter())
            .find(|request| request.id == id)
            .cloned()
    }

    /// Reconcile one server response by identity.
    ///
    /// Responses for different requests may resolve in any order, so a
    /// resource older than the cached copy is discarded rather than applied.
    pub fn apply(&self, resource: SkillRequest) -> ApplyOutcome {
        let mut list = self.write();
        let RequestList { received, sent } = &mut *list;

        let cached = received
            .iter_mut()
            .chain(sent.iter_mut())
            .find(|request| request.id == resource.id);

        if let Some(cached) = cached {
            if resource.updated_at < cached.updated_at {
                tracing::debug!(id = resource.id, "ignoring response older than cached request");
                return ApplyOutcome::Stale;
            }
            if !cached.status.can_transition_to(resource.status) {
                tracing::warn!(
                    id = resource.id,
                    from = %cached.status,
                    to = %resource.status,
                    "server reported an unexpected status change"
                );
            }
            *cached = resource;
            return ApplyOutcome::Replaced;
        }

        match resource.party_of(self.viewer) {
            Some(Party::Requester) => sent.insert(0, resource),
            Some(Party::Recipient) => received.insert(0, resource),
            None => {
                tracing::warn!(id = resource.id, "request does not involve the viewer");
                return ApplyOutcome::Ignored;
            }
        }
        ApplyOutcome::Inserted
    }

    /// Drop a request from the local view. Returns whether it was cached.
    pub fn remove(&self, id: RequestId) -> bool {
        let mut list = self.write();
        let before = list.received.len() + list.sent.len();
        list.received.retain(|request| request.id != id);
        list.sent.retain(|request| request.id != id);
        before != list.received.len() + list.sent.len()
    }
}
