//! Automation, automation email, enrollment and log models.

use newsroom_core::automation::DEFAULT_STEP_DELAY_SECS;
use newsroom_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `automations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Automation {
    pub id: DbId,
    pub name: String,
    pub automation_type: String,
    pub trigger_type: Option<String>,
    pub active: bool,
    pub initial_delay_secs: i64,
    pub inactive_days: Option<i32>,
    pub conditions: serde_json::Value,
    pub emails_sent: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `automation_emails` table. `position` orders the sequence.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationEmail {
    pub id: DbId,
    pub automation_id: DbId,
    pub position: i32,
    pub subject: String,
    pub content: String,
    pub delay_secs: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An automation together with its ordered emails.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationWithEmails {
    #[serde(flatten)]
    pub automation: Automation,
    pub emails: Vec<AutomationEmail>,
}

/// A row from the `subscriber_automations` table: one subscriber's progress
/// through one automation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubscriberAutomation {
    pub id: DbId,
    pub automation_id: Option<DbId>,
    pub subscriber_id: Option<DbId>,
    pub current_email_index: i32,
    pub status: String,
    pub started_at: Timestamp,
    pub next_email_at: Option<Timestamp>,
    pub last_email_sent_at: Option<Timestamp>,
    pub last_email_id: Option<DbId>,
    pub ended_at: Option<Timestamp>,
    pub end_reason: Option<String>,
    pub custom_data: serde_json::Value,
    pub locked_until: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `automation_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationLog {
    pub id: DbId,
    pub automation_id: Option<DbId>,
    pub subscriber_id: Option<DbId>,
    pub automation_email_id: Option<DbId>,
    pub success: bool,
    pub error: Option<String>,
    pub sent_at: Timestamp,
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

fn default_step_delay() -> i64 {
    DEFAULT_STEP_DELAY_SECS
}

/// One email of a new automation. Position comes from list order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAutomationEmail {
    pub subject: String,
    pub content: String,
    /// Seconds to wait after the previous email. Defaults to one day.
    #[serde(default = "default_step_delay")]
    pub delay_secs: i64,
}

/// DTO for creating an automation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAutomation {
    pub name: String,
    pub automation_type: String,
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub initial_delay_secs: i64,
    pub inactive_days: Option<i32>,
    pub conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub emails: Vec<CreateAutomationEmail>,
}

/// DTO for updating an automation. When `emails` is given the whole
/// sequence is replaced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAutomation {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub trigger_type: Option<String>,
    pub initial_delay_secs: Option<i64>,
    pub inactive_days: Option<i32>,
    pub conditions: Option<serde_json::Value>,
    pub emails: Option<Vec<CreateAutomationEmail>>,
}

/// DTO for enrolling a subscriber.
#[derive(Debug, Clone)]
pub struct CreateEnrollment {
    pub automation_id: DbId,
    pub subscriber_id: DbId,
    pub next_email_at: Timestamp,
    pub custom_data: serde_json::Value,
}

/// DTO for an automation log entry.
#[derive(Debug, Clone)]
pub struct CreateAutomationLog {
    pub automation_id: DbId,
    pub subscriber_id: DbId,
    pub automation_email_id: DbId,
    pub success: bool,
    pub error: Option<String>,
}
