//! Authenticated session: the signed-in user plus the cookie jar shared by the
//! HTTP client and the notification socket handshake.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use skillswap_shared::{is_local_address, ApiError, UserId, NOTIFICATION_SOCKET_PATH};
use url::Url;

use crate::api_client::ApiClient;

/// Session state for one signed-in user
#[derive(Clone, Debug)]
pub struct AuthSession {
    user_id: UserId,
    api_base: Url,
    jar: Arc<Jar>,
}

impl AuthSession {
    /// Create a session for `user_id` against the API rooted at `api_base`
    /// (e.g. `https://host/api` or `localhost:8000/api`).
    pub fn new(user_id: UserId, api_base: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            user_id,
            api_base: Url::parse(&normalize_base_url(api_base))?,
            jar: Arc::new(Jar::default()),
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str().trim_end_matches('/')
    }

    /// Load a `Set-Cookie`-style string (e.g. `sessionid=abc; Path=/`) into the jar.
    pub fn seed_cookie(&self, cookie: &str) {
        self.jar.add_cookie_str(cookie, &self.api_base);
    }

    /// `Cookie` header value the server expects on the socket upgrade.
    pub fn cookie_header(&self) -> Option<String> {
        let value = self.jar.cookies(&self.api_base)?;
        value.to_str().ok().map(str::to_string)
    }

    /// Create an API client that shares this session's cookies
    pub fn client(&self, timeout: Duration) -> Result<ApiClient, ApiError> {
        Ok(ApiClient::with_session(self.jar.clone(), timeout)?.with_base_url(self.api_base()))
    }

    /// Notification socket URL on the same origin as the API
    pub fn ws_url(&self) -> String {
        let mut url = self.api_base.clone();
        url.set_path(NOTIFICATION_SOCKET_PATH);
        url.set_query(None);
        http_to_ws(url.as_str())
    }
}

/// Prefix a scheme when the base is a bare host: plain http for local
/// addresses, https for everything else.
pub fn normalize_base_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.contains("://") {
        return base.to_string();
    }
    if is_local_address(base) {
        format!("http://{}", base)
    } else {
        format!("https://{}", base)
    }
}

/// Convert HTTP/HTTPS URL to WS/WSS
pub fn http_to_ws(url: &str) -> String {
    if url.starts_with("https://") {
        url.replacen("https://", "wss://", 1)
    } else if url.starts_with("http://") {
        url.replacen("http://", "ws://", 1)
    } else {
        url.to_string()
    }
}
