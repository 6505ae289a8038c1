//! Email delivery log model.

use newsroom_core::bounce::BounceKind;
use newsroom_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::tracking::EmailSource;

/// A row from the `email_deliveries` table: one send attempt to one recipient.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailDelivery {
    pub id: DbId,
    pub newsletter_id: Option<DbId>,
    pub automation_email_id: Option<DbId>,
    pub subscriber_id: Option<DbId>,
    pub send_job_id: Option<DbId>,
    pub status: String,
    pub error: Option<String>,
    pub provider: String,
    pub bounce_processed: bool,
    /// `hard`/`soft` when the failure was about the recipient.
    pub bounce_kind: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub sent_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for recording a send attempt.
#[derive(Debug, Clone)]
pub struct CreateDelivery {
    pub source: EmailSource,
    pub subscriber_id: DbId,
    pub send_job_id: Option<DbId>,
    pub status: &'static str,
    pub error: Option<String>,
    pub bounce_kind: Option<BounceKind>,
    pub provider: String,
}
