//! Client-side API error type and user-facing message extraction.

use serde::Deserialize;
use thiserror::Error;

/// Fallback shown when neither the server nor the transport gives a usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Structured error envelope returned by the API.
///
/// Endpoints report failures either as `{"error": "..."}` or `{"detail": "..."}`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

fn non_empty(value: Option<&serde_json::Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Attempt to pull a user-facing message out of an error response body.
/// Prefers `error`, falls back to `detail`.
pub fn try_server_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    non_empty(parsed.error.as_ref()).or_else(|| non_empty(parsed.detail.as_ref()))
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message from the transport itself, without any server-provided detail.
    pub fn transport_message(&self) -> String {
        match self {
            ApiError::Network(msg) | ApiError::Deserialize(msg) => msg.trim().to_string(),
            ApiError::Http { status, .. } => {
                format!("Request failed with status code {}", status)
            }
            ApiError::Timeout => "Request timed out".to_string(),
        }
    }

    /// Human-readable message for the user, in priority order: the server's
    /// `error` field, its `detail` field, the transport message, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let ApiError::Http { body, .. } = self {
            if let Some(message) = try_server_message(body) {
                return message;
            }
        }
        let transport = self.transport_message();
        if transport.is_empty() {
            fallback.to_string()
        } else {
            transport
        }
    }
}
