//! HTTP API client for the SkillSwap REST surface.
//!
//! Authentication rides on the session cookie held in a shared jar; no request
//! body ever carries credentials.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skillswap_shared::{
    confirm_completion_path, list_requests_path, request_completion_path, request_path,
    unread_count_path, ApiError, CreateSkillRequest, MarkAllReadRequest, OfferId, RequestId,
    RequestList, RequestStatus, SkillRequest, TransitionAction, TransitionRequest, UnreadCount,
    AUTH_REFRESH_PATH, MARK_ALL_READ_PATH, REQUESTS_PATH,
};

/// HTTP client for making API requests against one SkillSwap backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client without a session
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
        }
    }

    /// Create a client whose requests carry the cookies in `jar` and give up after `timeout`.
    pub fn with_session(jar: Arc<Jar>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: String::new(),
        })
    }

    /// Set the base URL for API requests (e.g. `https://host/api`)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Send a request and return the body of a 2xx response.
    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = rb.send().await.map_err(transport_error)?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp.text().await.map_err(transport_error)?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    fn decode<TRes: DeserializeOwned>(text: &str) -> Result<TRes, ApiError> {
        let text = if text.trim().is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(self.client.get(self.url(path))).await?;
        Self::decode(&text)
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self
            .execute(self.client.post(self.url(path)).json(body))
            .await?;
        Self::decode(&text)
    }

    /// Make a POST request whose response body is irrelevant
    pub async fn post_unit<TReq: Serialize>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<(), ApiError> {
        self.execute(self.client.post(self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    /// Make a PATCH request with JSON body
    pub async fn patch_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self
            .execute(self.client.patch(self.url(path)).json(body))
            .await?;
        Self::decode(&text)
    }

    // --- Skill request API methods ---

    /// List received and sent requests, optionally filtered by status
    pub async fn list_requests(&self, statuses: &[RequestStatus]) -> Result<RequestList, ApiError> {
        self.get_json(&list_requests_path(statuses)).await
    }

    /// Create a request against an offer/seek card
    pub async fn create_request(&self, offer_id: OfferId) -> Result<SkillRequest, ApiError> {
        self.post_json(REQUESTS_PATH, &CreateSkillRequest { offer_id })
            .await
    }

    /// Apply accept/reject/cancel/hide to a request
    pub async fn transition_request(
        &self,
        id: RequestId,
        action: TransitionAction,
    ) -> Result<SkillRequest, ApiError> {
        self.patch_json(&request_path(id), &TransitionRequest { action })
            .await
    }

    /// Recipient asks the requester to confirm the work is done
    pub async fn request_completion(&self, id: RequestId) -> Result<SkillRequest, ApiError> {
        self.post_json(&request_completion_path(id), &serde_json::json!({}))
            .await
    }

    /// Requester confirms completion
    pub async fn confirm_completion(&self, id: RequestId) -> Result<SkillRequest, ApiError> {
        self.post_json(&confirm_completion_path(id), &serde_json::json!({}))
            .await
    }

    // --- Notification / session API methods ---

    /// Unread skill-request notification count
    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        let count: UnreadCount = self.get_json(&unread_count_path()).await?;
        Ok(count.count)
    }

    /// Acknowledge every skill-request notification
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.post_unit(MARK_ALL_READ_PATH, &MarkAllReadRequest::skill_requests())
            .await
    }

    /// Exchange the refresh cookie for a fresh session
    pub async fn refresh_session(&self) -> Result<(), ApiError> {
        self.post_unit(AUTH_REFRESH_PATH, &serde_json::json!({}))
            .await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}
