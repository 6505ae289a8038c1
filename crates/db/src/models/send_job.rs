//! Send job model.

use newsroom_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `send_jobs` table: progress of one batch send.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SendJob {
    pub id: DbId,
    pub newsletter_id: DbId,
    pub total_subscribers: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub status: String,
    pub batch_size: i32,
    pub delay_secs: i64,
    pub current_batch: i32,
    pub total_batches: i32,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
