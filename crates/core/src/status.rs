//! Well-known status value constants.
//!
//! These must match the `CHECK` constraints in the migrations under
//! `db/migrations/` and are shared by the repositories, the delivery pipeline
//! and the API handlers.

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Receives newsletters and automation emails.
pub const SUBSCRIBER_ACTIVE: &str = "active";

/// Captured but not yet confirmed.
pub const SUBSCRIBER_PENDING: &str = "pending";

/// Opted out. Removed by list cleaning.
pub const SUBSCRIBER_UNSUBSCRIBED: &str = "unsubscribed";

/// Hard bounce or repeated soft bounces. Removed by list cleaning.
pub const SUBSCRIBER_BOUNCED: &str = "bounced";

/// No opens for a long period.
pub const SUBSCRIBER_INACTIVE: &str = "inactive";

/// Every valid subscriber status.
pub const SUBSCRIBER_STATUSES: &[&str] = &[
    SUBSCRIBER_ACTIVE,
    SUBSCRIBER_PENDING,
    SUBSCRIBER_UNSUBSCRIBED,
    SUBSCRIBER_BOUNCED,
    SUBSCRIBER_INACTIVE,
];

// ---------------------------------------------------------------------------
// Newsletters
// ---------------------------------------------------------------------------

pub const NEWSLETTER_DRAFT: &str = "draft";
pub const NEWSLETTER_SCHEDULED: &str = "scheduled";
pub const NEWSLETTER_SENDING: &str = "sending";
pub const NEWSLETTER_SENT: &str = "sent";

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

pub const TRACKING_OPEN: &str = "open";
pub const TRACKING_CLICK: &str = "click";

// ---------------------------------------------------------------------------
// Deliveries and send jobs
// ---------------------------------------------------------------------------

pub const DELIVERY_SENT: &str = "sent";
pub const DELIVERY_FAILED: &str = "failed";

pub const JOB_IN_PROGRESS: &str = "in_progress";
pub const JOB_COMPLETED: &str = "completed";
pub const JOB_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Automation enrollments
// ---------------------------------------------------------------------------

pub const ENROLLMENT_ACTIVE: &str = "active";
pub const ENROLLMENT_COMPLETED: &str = "completed";

pub const END_AUTOMATION_DELETED: &str = "automation_deleted";
pub const END_SUBSCRIBER_DELETED: &str = "subscriber_deleted";
pub const END_SEQUENCE_COMPLETED: &str = "sequence_completed";

/// End reason recorded when an enrolled subscriber is no longer active,
/// e.g. `subscriber_unsubscribed`.
pub fn end_reason_for_subscriber_status(status: &str) -> String {
    format!("subscriber_{status}")
}

/// Returns `true` if `status` is a known subscriber status.
pub fn is_valid_subscriber_status(status: &str) -> bool {
    SUBSCRIBER_STATUSES.contains(&status)
}
