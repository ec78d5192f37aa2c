//! REST paths, socket constants and close codes shared by client and test backends.
//!
//! All REST paths are relative to the `/api` base.

use crate::models::{RequestId, RequestStatus};

/// Notification type carried by skill-request socket payloads and count queries.
pub const SKILL_REQUEST_NOTIFICATION: &str = "skill_request";

/// Path of the notification socket, relative to the server origin.
pub const NOTIFICATION_SOCKET_PATH: &str = "/ws/notifications/";

/// Close codes the server uses to reject an unauthenticated socket.
pub const UNAUTHORIZED_CLOSE_CODES: [u16; 2] = [4001, 4003];

pub const REQUESTS_PATH: &str = "/requests/";
pub const UNREAD_COUNT_PATH: &str = "/notifications/unread-count/";
pub const MARK_ALL_READ_PATH: &str = "/notifications/mark-all-read/";
pub const AUTH_REFRESH_PATH: &str = "/auth/refresh/";

/// `GET /requests/`, optionally filtered by a comma-separated status list.
pub fn list_requests_path(statuses: &[RequestStatus]) -> String {
    if statuses.is_empty() {
        return REQUESTS_PATH.to_string();
    }
    let joined = statuses
        .iter()
        .map(RequestStatus::as_str)
        .collect::<Vec<_>>()
        .join(",");
    format!("{}?status={}", REQUESTS_PATH, joined)
}

pub fn request_path(id: RequestId) -> String {
    format!("{}{}/", REQUESTS_PATH, id)
}

pub fn request_completion_path(id: RequestId) -> String {
    format!("{}{}/request-completion/", REQUESTS_PATH, id)
}

pub fn confirm_completion_path(id: RequestId) -> String {
    format!("{}{}/confirm-completion/", REQUESTS_PATH, id)
}

pub fn unread_count_path() -> String {
    format!("{}?type={}", UNREAD_COUNT_PATH, SKILL_REQUEST_NOTIFICATION)
}

/// Check if a host is a local/development address.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}
