//! Tracking event models.

use newsroom_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `tracking_events` table.
///
/// Written with `tracked = false` before an email goes out and updated on
/// every pixel load or link click.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrackingEvent {
    pub id: DbId,
    pub tracking_id: Uuid,
    pub kind: String,
    pub newsletter_id: Option<DbId>,
    pub automation_email_id: Option<DbId>,
    pub subscriber_id: Option<DbId>,
    pub original_url: Option<String>,
    pub tracked: bool,
    pub tracked_at: Option<Timestamp>,
    pub hit_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// What a tracked email was: a newsletter or one step of an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EmailSource {
    Newsletter(DbId),
    AutomationEmail(DbId),
}

impl EmailSource {
    pub fn newsletter_id(&self) -> Option<DbId> {
        match self {
            Self::Newsletter(id) => Some(*id),
            Self::AutomationEmail(_) => None,
        }
    }

    pub fn automation_email_id(&self) -> Option<DbId> {
        match self {
            Self::AutomationEmail(id) => Some(*id),
            Self::Newsletter(_) => None,
        }
    }
}

/// DTO for a tracking row to store before sending.
#[derive(Debug, Clone)]
pub struct CreateTrackingEvent {
    pub tracking_id: Uuid,
    pub kind: &'static str,
    pub original_url: Option<String>,
}

/// Clicks on one URL of a newsletter.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UrlClicks {
    pub url: String,
    pub clicks: i64,
}
