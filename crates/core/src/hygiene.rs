//! Subscriber list cleaning rules.

use chrono::Duration;

use crate::status::{SUBSCRIBER_ACTIVE, SUBSCRIBER_BOUNCED, SUBSCRIBER_UNSUBSCRIBED};
use crate::types::Timestamp;

/// Days without an open after which an active subscriber becomes inactive.
pub const INACTIVITY_DAYS: i64 = 180;

pub const INACTIVE_REASON: &str = "No opens for 6+ months";

/// What list cleaning does with one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Archive into `removed_subscribers` with this reason, then delete.
    Remove { reason: &'static str },
    /// Set status `inactive`.
    MarkInactive,
    Keep,
}

/// Classify a subscriber by status and last open time.
///
/// Subscribers who never opened anything are kept: there is no baseline to
/// measure six months from.
pub fn classify(status: &str, last_opened_at: Option<Timestamp>, now: Timestamp) -> CleanupAction {
    match status {
        SUBSCRIBER_BOUNCED => CleanupAction::Remove {
            reason: SUBSCRIBER_BOUNCED,
        },
        SUBSCRIBER_UNSUBSCRIBED => CleanupAction::Remove {
            reason: SUBSCRIBER_UNSUBSCRIBED,
        },
        SUBSCRIBER_ACTIVE => match last_opened_at {
            Some(at) if now - at > Duration::days(INACTIVITY_DAYS) => CleanupAction::MarkInactive,
            _ => CleanupAction::Keep,
        },
        _ => CleanupAction::Keep,
    }
}

/// Cutoff before which a last open makes an active subscriber inactive.
pub fn inactivity_cutoff(now: Timestamp) -> Timestamp {
    now - Duration::days(INACTIVITY_DAYS)
}
