//! Newsletter validation, audience selection and rendering.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::{NEWSLETTER_DRAFT, NEWSLETTER_SCHEDULED};
use crate::template::{render_template, NewsletterTemplate, TemplateData};
use crate::types::{DbId, Timestamp};

/// Engagement score a subscriber needs to be included in a `segment` send.
pub const SEGMENT_MIN_ENGAGEMENT: i32 = 40;

/// Maximum subject line length accepted by the editor.
pub const MAX_SUBJECT_LENGTH: usize = 255;

/// Who a newsletter goes to when it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetAudience {
    /// Every active subscriber.
    #[default]
    All,
    /// Active subscribers with an engagement score of at least
    /// [`SEGMENT_MIN_ENGAGEMENT`].
    Segment,
    /// An explicit list of subscriber ids.
    Test { subscriber_ids: Vec<DbId> },
}

impl TargetAudience {
    /// Parse the stored JSON form. `null` means [`TargetAudience::All`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        if value.is_null() {
            return Ok(Self::All);
        }
        serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid target audience: {e}")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The content-bearing fields of a newsletter, as submitted by the editor.
#[derive(Debug, Clone, Copy)]
pub struct NewsletterContent<'a> {
    pub title: &'a str,
    pub subject: &'a str,
    pub content: &'a str,
    pub use_template: bool,
    pub template: &'a str,
    pub template_data: &'a serde_json::Value,
}

impl NewsletterContent<'_> {
    /// Title and subject are always required. Template-based newsletters need
    /// the required template fields; free-form ones need content.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("Title is required".into()));
        }
        if self.subject.trim().is_empty() {
            return Err(CoreError::Validation("Subject is required".into()));
        }
        if self.subject.chars().count() > MAX_SUBJECT_LENGTH {
            return Err(CoreError::Validation(format!(
                "Subject must be at most {MAX_SUBJECT_LENGTH} characters"
            )));
        }

        if self.use_template {
            self.template.parse::<NewsletterTemplate>()?;
            TemplateData::from_json(self.template_data)?.validate()
        } else if self.content.trim().is_empty() {
            Err(CoreError::Validation("Content is required".into()))
        } else {
            Ok(())
        }
    }

    /// Produce the email body HTML.
    pub fn render(&self, year: i32) -> Result<String, CoreError> {
        if self.use_template {
            let template: NewsletterTemplate = self.template.parse()?;
            let data = TemplateData::from_json(self.template_data)?;
            render_template(template, &data, year)
        } else {
            Ok(self.content.to_string())
        }
    }
}

/// Status a newly created newsletter starts in.
pub fn initial_status(scheduled_at: Option<Timestamp>) -> &'static str {
    if scheduled_at.is_some() {
        NEWSLETTER_SCHEDULED
    } else {
        NEWSLETTER_DRAFT
    }
}

/// Statuses from which a newsletter may be claimed for sending.
pub const CLAIMABLE_STATUSES: &[&str] = &[NEWSLETTER_DRAFT, NEWSLETTER_SCHEDULED];
