//! Client-side state derived from server responses and socket pushes.

pub mod notifications;
pub mod requests;

pub use notifications::NotificationState;
pub use requests::{ApplyOutcome, RequestsStore};
