//! Shared data models for the SkillSwap request API and notification socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::SKILL_REQUEST_NOTIFICATION;

pub type UserId = i64;
pub type RequestId = i64;
pub type OfferId = i64;

// --- Request status state machine ---

/// Server-reported status of a skill request.
///
/// ```text
/// pending --accept--> accepted
/// pending --reject--> rejected
/// pending --cancel--> cancelled
/// accepted --request_completion--> completion_requested
/// completion_requested --confirm_completion--> completed
/// rejected | cancelled --hide--> (removed from the actor's view)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    CompletionRequested,
    Completed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
        RequestStatus::CompletionRequested,
        RequestStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::CompletionRequested => "completion_requested",
            RequestStatus::Completed => "completed",
        }
    }

    /// Whether `action` may be offered for a request currently in this status.
    ///
    /// This is a UX guard only. The server re-validates every transition.
    pub fn allows(&self, action: RequestAction) -> bool {
        use RequestAction::*;
        use RequestStatus::*;
        matches!(
            (self, action),
            (Pending, Accept)
                | (Pending, Reject)
                | (Pending, Cancel)
                | (Accepted, RequestCompletion)
                | (CompletionRequested, ConfirmCompletion)
                | (Rejected, Hide)
                | (Cancelled, Hide)
        )
    }

    /// Status reached by applying `action`, if it is allowed.
    ///
    /// `hide` is allowed but yields `None`: hiding is not a status.
    pub fn apply(&self, action: RequestAction) -> Option<RequestStatus> {
        if !self.allows(action) {
            return None;
        }
        match action {
            RequestAction::Accept => Some(RequestStatus::Accepted),
            RequestAction::Reject => Some(RequestStatus::Rejected),
            RequestAction::Cancel => Some(RequestStatus::Cancelled),
            RequestAction::RequestCompletion => Some(RequestStatus::CompletionRequested),
            RequestAction::ConfirmCompletion => Some(RequestStatus::Completed),
            RequestAction::Hide => None,
        }
    }

    /// Whether moving from this status to `next` is an edge of the state machine
    /// (or no change at all).
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        *self == next
            || RequestAction::ALL
                .iter()
                .any(|action| self.apply(*action) == Some(next))
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a request a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Requester,
    Recipient,
}

/// Every action a user can take on a skill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestAction {
    Accept,
    Reject,
    Cancel,
    Hide,
    RequestCompletion,
    ConfirmCompletion,
}

impl RequestAction {
    pub const ALL: [RequestAction; 6] = [
        RequestAction::Accept,
        RequestAction::Reject,
        RequestAction::Cancel,
        RequestAction::Hide,
        RequestAction::RequestCompletion,
        RequestAction::ConfirmCompletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Reject => "reject",
            RequestAction::Cancel => "cancel",
            RequestAction::Hide => "hide",
            RequestAction::RequestCompletion => "request_completion",
            RequestAction::ConfirmCompletion => "confirm_completion",
        }
    }

    /// The party allowed to initiate this action. `None` means either party.
    pub fn initiator(&self) -> Option<Party> {
        match self {
            RequestAction::Accept | RequestAction::Reject | RequestAction::RequestCompletion => {
                Some(Party::Recipient)
            }
            RequestAction::Cancel | RequestAction::ConfirmCompletion => Some(Party::Requester),
            RequestAction::Hide => None,
        }
    }
}

/// Actions sent through `PATCH /requests/{id}/`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Accept,
    Reject,
    Cancel,
    Hide,
}

impl From<TransitionAction> for RequestAction {
    fn from(action: TransitionAction) -> Self {
        match action {
            TransitionAction::Accept => RequestAction::Accept,
            TransitionAction::Reject => RequestAction::Reject,
            TransitionAction::Cancel => RequestAction::Cancel,
            TransitionAction::Hide => RequestAction::Hide,
        }
    }
}

// --- Resources ---

/// Denormalized snapshot of the offer/seek card a request points at.
///
/// May be stale relative to the live offer; never used to derive identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OfferSummary {
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub is_seeking: bool,
    #[serde(default)]
    pub is_hidden: bool,
    /// Decimal price as the API renders it.
    #[serde(default)]
    pub price: Option<String>,
    pub owner: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillRequest {
    pub id: RequestId,
    pub requester: UserId,
    pub recipient: UserId,
    pub offer: OfferId,
    #[serde(default)]
    pub offer_details: Option<OfferSummary>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillRequest {
    pub fn party_of(&self, user: UserId) -> Option<Party> {
        if user == self.requester {
            Some(Party::Requester)
        } else if user == self.recipient {
            Some(Party::Recipient)
        } else {
            None
        }
    }

    /// Whether `viewer` should be offered `action` on this request.
    pub fn is_action_enabled(&self, viewer: UserId, action: RequestAction) -> bool {
        let Some(party) = self.party_of(viewer) else {
            return false;
        };
        if !self.status.allows(action) {
            return false;
        }
        action.initiator().map_or(true, |initiator| initiator == party)
    }

    /// Actions `viewer` should be offered, in a stable order.
    pub fn available_actions(&self, viewer: UserId) -> Vec<RequestAction> {
        RequestAction::ALL
            .into_iter()
            .filter(|action| self.is_action_enabled(viewer, *action))
            .collect()
    }
}

/// Response of `GET /requests/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestList {
    #[serde(default)]
    pub received: Vec<SkillRequest>,
    #[serde(default)]
    pub sent: Vec<SkillRequest>,
}

// --- Request bodies ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSkillRequest {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionRequest {
    pub action: TransitionAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkAllReadRequest {
    #[serde(rename = "type")]
    pub notification_type: String,
}

impl MarkAllReadRequest {
    pub fn skill_requests() -> Self {
        Self {
            notification_type: SKILL_REQUEST_NOTIFICATION.to_string(),
        }
    }
}

// --- Socket payloads ---

/// A payload pushed over the notification socket.
///
/// Only `type` is required. Payloads of other types are kept verbatim in
/// `payload` and forwarded to listeners unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub kind: String,
    pub unread_count: Option<u64>,
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct EventHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    unread_count: Option<u64>,
}

impl NotificationEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let payload: serde_json::Value = serde_json::from_str(text)?;
        let header = EventHeader::deserialize(&payload)?;
        Ok(Self {
            kind: header.kind,
            unread_count: header.unread_count,
            payload,
        })
    }

    pub fn is_skill_request(&self) -> bool {
        self.kind == SKILL_REQUEST_NOTIFICATION
    }
}
