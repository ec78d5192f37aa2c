//! Client configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use skillswap_shared::UserId;

use crate::auth_session::AuthSession;
use crate::ws::RealtimeConfig;

const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;

/// Everything needed to wire the client at start-up
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    /// Explicit socket URL; derived from the API origin when absent.
    pub ws_url: Option<String>,
    pub user_id: UserId,
    /// Session cookie to seed the jar with, e.g. `sessionid=abc`.
    pub session_cookie: Option<String>,
    pub http_timeout: Duration,
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `SKILLSWAP_API_BASE`: REST base URL (default: "http://localhost:8000/api")
    /// - `SKILLSWAP_WS_URL`: notification socket URL (default: derived from the API origin)
    /// - `SKILLSWAP_USER_ID`: signed-in user id (required)
    /// - `SKILLSWAP_SESSION_COOKIE`: session cookie for HTTP and the socket upgrade
    /// - `SKILLSWAP_HTTP_TIMEOUT_MS`: per-request timeout (default: 15000)
    /// - `SKILLSWAP_GRACE_MS`, `SKILLSWAP_BACKOFF_BASE_MS`, `SKILLSWAP_BACKOFF_CAP_MS`:
    ///   realtime timing overrides
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let millis = |key: &str| -> Result<Option<Duration>> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .with_context(|| format!("{key} must be a whole number of milliseconds"))
                })
                .transpose()
        };

        let user_id = lookup("SKILLSWAP_USER_ID")
            .context("SKILLSWAP_USER_ID is required")?
            .trim()
            .parse::<UserId>()
            .context("SKILLSWAP_USER_ID must be an integer")?;

        let mut realtime = RealtimeConfig::default();
        if let Some(grace) = millis("SKILLSWAP_GRACE_MS")? {
            realtime.grace_period = grace;
        }
        if let Some(base) = millis("SKILLSWAP_BACKOFF_BASE_MS")? {
            realtime.backoff_base = base;
        }
        if let Some(cap) = millis("SKILLSWAP_BACKOFF_CAP_MS")? {
            realtime.backoff_cap = cap;
        }

        Ok(Self {
            api_base: lookup("SKILLSWAP_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            ws_url: lookup("SKILLSWAP_WS_URL").filter(|url| !url.trim().is_empty()),
            user_id,
            session_cookie: lookup("SKILLSWAP_SESSION_COOKIE").filter(|c| !c.trim().is_empty()),
            http_timeout: millis("SKILLSWAP_HTTP_TIMEOUT_MS")?
                .unwrap_or(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS)),
            realtime,
        })
    }

    /// Build the session described by this configuration, cookie included.
    pub fn session(&self) -> Result<AuthSession> {
        let session = AuthSession::new(self.user_id, &self.api_base)
            .with_context(|| format!("invalid API base URL: {}", self.api_base))?;
        if let Some(cookie) = &self.session_cookie {
            session.seed_cookie(cookie);
        }
        Ok(session)
    }

    pub fn socket_url(&self, session: &AuthSession) -> String {
        self.ws_url.clone().unwrap_or_else(|| session.ws_url())
    }
}
