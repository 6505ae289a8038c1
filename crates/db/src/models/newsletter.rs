//! Newsletter models and DTOs.

use newsroom_core::newsletter::{NewsletterContent, TargetAudience};
use newsroom_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `newsletters` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Newsletter {
    pub id: DbId,
    pub title: String,
    pub subject: String,
    pub content: String,
    pub use_template: bool,
    pub template: String,
    pub template_data: serde_json::Value,
    pub target_audience: serde_json::Value,
    pub status: String,
    pub scheduled_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub sent_count: i64,
    pub open_count: i64,
    pub click_count: i64,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Newsletter {
    /// Borrow the content-bearing fields for validation and rendering.
    pub fn content_view(&self) -> NewsletterContent<'_> {
        NewsletterContent {
            title: &self.title,
            subject: &self.subject,
            content: &self.content,
            use_template: self.use_template,
            template: &self.template,
            template_data: &self.template_data,
        }
    }
}

/// Public archive entry. Leaves out counters and template internals.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ArchivedNewsletter {
    pub id: DbId,
    pub title: String,
    pub subject: String,
    pub sent_at: Option<Timestamp>,
}

/// Lightweight row for dashboard listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NewsletterSummary {
    pub id: DbId,
    pub title: String,
    pub status: String,
    pub sent_count: i64,
    pub open_count: i64,
    pub click_count: i64,
    pub created_at: Timestamp,
}

/// DTO for creating a newsletter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateNewsletter {
    pub title: String,
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub use_template: bool,
    pub template: Option<String>,
    pub template_data: Option<serde_json::Value>,
    pub target_audience: Option<TargetAudience>,
    pub scheduled_at: Option<Timestamp>,
}

static NO_TEMPLATE_DATA: serde_json::Value = serde_json::Value::Null;

impl CreateNewsletter {
    pub fn content_view(&self) -> NewsletterContent<'_> {
        NewsletterContent {
            title: &self.title,
            subject: &self.subject,
            content: &self.content,
            use_template: self.use_template,
            template: self.template.as_deref().unwrap_or("modern"),
            template_data: self.template_data.as_ref().unwrap_or(&NO_TEMPLATE_DATA),
        }
    }
}

/// DTO for updating a newsletter. Only non-`None` fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNewsletter {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub use_template: Option<bool>,
    pub template: Option<String>,
    pub template_data: Option<serde_json::Value>,
    pub target_audience: Option<TargetAudience>,
    pub scheduled_at: Option<Timestamp>,
}

/// Query parameters for `GET /admin/newsletters`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsletterListParams {
    pub limit: Option<i64>,
}

/// Status counts for the dashboard.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct NewsletterCounts {
    pub total: i64,
    pub draft: i64,
    pub scheduled: i64,
    pub sent: i64,
    pub emails_sent: i64,
}
