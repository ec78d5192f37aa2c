//! Skill-request lifecycle operations.
//!
//! Every mutation waits for the server's returned resource and reconciles it
//! into the [`RequestsStore`]; nothing is applied optimistically. A failed call
//! leaves the cache as it was and hands the error back to the caller, which
//! shows [`ApiError::user_message`].

use skillswap_shared::{
    ApiError, OfferId, RequestAction, RequestId, RequestList, RequestStatus, SkillRequest,
    TransitionAction, UserId,
};

use crate::api_client::ApiClient;
use crate::stores::RequestsStore;

#[derive(Debug, Clone)]
pub struct RequestLifecycleClient {
    api: ApiClient,
    store: RequestsStore,
}

impl RequestLifecycleClient {
    pub fn new(api: ApiClient, viewer: UserId) -> Self {
        Self {
            api,
            store: RequestsStore::new(viewer),
        }
    }

    pub fn store(&self) -> &RequestsStore {
        &self.store
    }

    pub fn viewer(&self) -> UserId {
        self.store.viewer()
    }

    /// Fetch both partitions, optionally filtered by status (empty means all).
    ///
    /// Read failures are not errors to the caller: the previous cache stays in
    /// place and `None` is returned.
    pub async fn list(&self, statuses: &[RequestStatus]) -> Option<RequestList> {
        match self.api.list_requests(statuses).await {
            Ok(list) => {
                tracing::debug!(
                    received = list.received.len(),
                    sent = list.sent.len(),
                    "requests listed"
                );
                self.store.replace_all(list.clone());
                Some(list)
            }
            Err(e) => {
                tracing::debug!(error = %e, "listing requests failed; keeping cached list");
                None
            }
        }
    }

    pub async fn create(&self, offer_id: OfferId) -> Result<SkillRequest, ApiError> {
        let created = self
            .api
            .create_request(offer_id)
            .await
            .inspect_err(|e| log_failure("create", offer_id, e))?;
        self.store.apply(created.clone());
        Ok(created)
    }

    /// Accept, reject, cancel or hide. A hidden request leaves the local view.
    pub async fn transition(
        &self,
        id: RequestId,
        action: TransitionAction,
    ) -> Result<SkillRequest, ApiError> {
        let updated = self
            .api
            .transition_request(id, action)
            .await
            .inspect_err(|e| log_failure(RequestAction::from(action).as_str(), id, e))?;
        if action == TransitionAction::Hide {
            self.store.remove(id);
        } else {
            self.store.apply(updated.clone());
        }
        Ok(updated)
    }

    pub async fn request_completion(&self, id: RequestId) -> Result<SkillRequest, ApiError> {
        let updated = self
            .api
            .request_completion(id)
            .await
            .inspect_err(|e| log_failure("request_completion", id, e))?;
        self.store.apply(updated.clone());
        Ok(updated)
    }

    pub async fn confirm_completion(&self, id: RequestId) -> Result<SkillRequest, ApiError> {
        let updated = self
            .api
            .confirm_completion(id)
            .await
            .inspect_err(|e| log_failure("confirm_completion", id, e))?;
        self.store.apply(updated.clone());
        Ok(updated)
    }

    /// Whether the viewer should be offered `action` on the cached request.
    /// Unknown ids offer nothing.
    pub fn is_action_enabled(&self, id: RequestId, action: RequestAction) -> bool {
        self.store
            .get(id)
            .is_some_and(|request| request.is_action_enabled(self.viewer(), action))
    }

    pub fn available_actions(&self, id: RequestId) -> Vec<RequestAction> {
        self.store
            .get(id)
            .map(|request| request.available_actions(self.viewer()))
            .unwrap_or_default()
    }
}

fn log_failure(action: &str, id: i64, error: &ApiError) {
    tracing::debug!(action, id, status = ?error.status(), error = %error, "request action failed");
}
