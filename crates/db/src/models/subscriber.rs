//! Subscriber models and DTOs.

use newsroom_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `subscribers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscriber {
    pub id: DbId,
    pub email: String,
    pub name: Option<String>,
    pub group_name: String,
    pub status: String,
    pub tags: Vec<String>,
    pub engagement_score: Option<i32>,
    pub open_count: i64,
    pub click_count: i64,
    pub soft_bounce_count: i32,
    pub last_opened_at: Option<Timestamp>,
    pub last_clicked_at: Option<Timestamp>,
    pub last_soft_bounce_at: Option<Timestamp>,
    pub bounce_reason: Option<String>,
    pub bounced_at: Option<Timestamp>,
    pub inactive_reason: Option<String>,
    pub custom_fields: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `removed_subscribers` archive.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RemovedSubscriber {
    pub id: DbId,
    pub original_id: DbId,
    pub email: String,
    pub reason: String,
    pub snapshot: serde_json::Value,
    pub removed_at: Timestamp,
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for adding a subscriber. The email is normalized before insert.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSubscriber {
    pub email: String,
    pub name: Option<String>,
    pub group_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub custom_fields: Option<serde_json::Value>,
}

/// DTO for updating a subscriber. Only non-`None` fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscriber {
    pub name: Option<String>,
    pub group_name: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub custom_fields: Option<serde_json::Value>,
}

/// Query parameters for `GET /admin/subscribers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriberListParams {
    pub status: Option<String>,
    pub tag: Option<String>,
    /// Maximum results. Defaults to 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// DTO for tagging many subscribers at once.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkTagRequest {
    pub subscriber_ids: Vec<DbId>,
    pub tag: String,
}

/// DTO for deleting many subscribers at once.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteRequest {
    pub subscriber_ids: Vec<DbId>,
}

/// Result summary for bulk operations.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BulkResult {
    pub succeeded: i64,
    pub failed: i64,
}

/// Status counts used by the dashboard and subscriber analytics.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct SubscriberCounts {
    pub total: i64,
    pub active: i64,
    pub unsubscribed: i64,
    pub bounced: i64,
    pub inactive: i64,
}
