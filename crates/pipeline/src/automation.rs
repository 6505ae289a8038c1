//! Automation sequences: CRUD, enrollment, trigger handling and the
//! per-subscriber advancer.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use newsroom_core::automation::{
    advance_after_send, conditions_match, first_email_at, is_inactive, parse_conditions,
    reacts_to, reengagement_subject, validate_automation, AutomationType, StepAdvance,
    TriggerType, DEFAULT_INACTIVE_DAYS, DEFAULT_STEP_DELAY_SECS,
};
use newsroom_core::status::{
    end_reason_for_subscriber_status, END_AUTOMATION_DELETED, END_SEQUENCE_COMPLETED,
    END_SUBSCRIBER_DELETED, SUBSCRIBER_ACTIVE,
};
use newsroom_core::types::{DbId, Timestamp};
use newsroom_db::models::automation::{
    Automation, AutomationEmail, AutomationWithEmails, CreateAutomation, CreateAutomationEmail,
    CreateAutomationLog, CreateEnrollment, SubscriberAutomation, UpdateAutomation,
};
use newsroom_db::repositories::{AutomationRepo, EnrollmentRepo, SubscriberRepo};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::sender::{EmailMessage, SendOutcome, Sender};

/// How long a claimed enrollment stays leased to one advancer pass.
const ENROLLMENT_LEASE_SECS: i64 = 300;

/// Maximum enrollments handled per advancer pass.
const ADVANCE_BATCH_LIMIT: i64 = 200;

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// Options for [`AutomationEngine::create_reengagement_campaign`].
#[derive(Debug, Clone, Deserialize)]
pub struct ReengagementRequest {
    pub name: String,
    pub content: String,
    pub subject: Option<String>,
    /// Days without an open. Defaults to 90.
    pub inactive_days: Option<i64>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReengagementResult {
    pub automation_id: DbId,
    pub enrolled: u64,
}

/// Options for [`AutomationEngine::create_welcome_sequence`].
#[derive(Debug, Clone, Deserialize)]
pub struct WelcomeRequest {
    pub name: String,
    pub emails: Vec<CreateAutomationEmail>,
    #[serde(default)]
    pub initial_delay_secs: i64,
    #[serde(default)]
    pub active: bool,
}

/// Counts from one advancer pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceSummary {
    pub processed: u64,
    pub sent: u64,
    pub errors: u64,
    /// Enrollments ended without a send (automation or subscriber gone,
    /// subscriber no longer active, nothing left to send).
    pub ended: u64,
}

/// What an enrollment needs to advance: its automation and ordered emails.
type SequenceCache = HashMap<DbId, Option<(Automation, Vec<AutomationEmail>)>>;

// ---------------------------------------------------------------------------
// AutomationEngine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AutomationEngine {
    pool: PgPool,
    sender: Sender,
}

impl AutomationEngine {
    pub fn new(pool: PgPool, sender: Sender) -> Self {
        Self { pool, sender }
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    pub async fn create_automation(
        &self,
        input: &CreateAutomation,
    ) -> Result<AutomationWithEmails, PipelineError> {
        let automation_type = validate_automation(&input.name, &input.automation_type)?;
        let trigger = parse_trigger(input.trigger_type.as_deref())?;
        if let Some(conditions) = &input.conditions {
            parse_conditions(conditions)?;
        }
        validate_emails(&input.emails)?;

        // Welcome sequences always start on subscription.
        let trigger = match automation_type {
            AutomationType::Welcome => Some(TriggerType::Subscription),
            _ => trigger,
        };

        let created =
            AutomationRepo::create(&self.pool, input, trigger.as_ref().map(TriggerType::as_str))
                .await?;
        tracing::info!(
            automation_id = created.automation.id,
            automation_type = %automation_type,
            emails = created.emails.len(),
            "Automation created",
        );
        Ok(created)
    }

    pub async fn get_automation(&self, id: DbId) -> Result<AutomationWithEmails, PipelineError> {
        AutomationRepo::find_with_emails(&self.pool, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Automation", id))
    }

    pub async fn list_automations(&self) -> Result<Vec<Automation>, PipelineError> {
        Ok(AutomationRepo::list(&self.pool).await?)
    }

    pub async fn update_automation(
        &self,
        id: DbId,
        input: &UpdateAutomation,
    ) -> Result<AutomationWithEmails, PipelineError> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(PipelineError::validation("Automation name is required"));
        }
        parse_trigger(input.trigger_type.as_deref())?;
        if let Some(conditions) = &input.conditions {
            parse_conditions(conditions)?;
        }
        if let Some(emails) = &input.emails {
            validate_emails(emails)?;
        }

        AutomationRepo::update(&self.pool, id, input)
            .await?
            .ok_or_else(|| PipelineError::not_found("Automation", id))
    }

    /// Delete an automation. Running enrollments are ended by the advancer.
    pub async fn delete_automation(&self, id: DbId) -> Result<(), PipelineError> {
        if !AutomationRepo::delete(&self.pool, id).await? {
            return Err(PipelineError::not_found("Automation", id));
        }
        tracing::info!(automation_id = id, "Automation deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Enrollment
    // -----------------------------------------------------------------------

    /// Enroll a subscriber in an active automation.
    pub async fn add_subscriber_to_automation(
        &self,
        automation_id: DbId,
        subscriber_id: DbId,
        custom_data: serde_json::Value,
    ) -> Result<SubscriberAutomation, PipelineError> {
        let automation = AutomationRepo::find_by_id(&self.pool, automation_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Automation", automation_id))?;
        if !automation.active {
            return Err(PipelineError::validation("Automation is not active"));
        }
        if SubscriberRepo::find_by_id(&self.pool, subscriber_id)
            .await?
            .is_none()
        {
            return Err(PipelineError::not_found("Subscriber", subscriber_id));
        }

        self.enroll(&automation, subscriber_id, custom_data)
            .await?
            .ok_or_else(|| PipelineError::conflict("Subscriber is already in this automation"))
    }

    async fn enroll(
        &self,
        automation: &Automation,
        subscriber_id: DbId,
        custom_data: serde_json::Value,
    ) -> Result<Option<SubscriberAutomation>, PipelineError> {
        let input = CreateEnrollment {
            automation_id: automation.id,
            subscriber_id,
            next_email_at: first_email_at(Utc::now(), automation.initial_delay_secs),
            custom_data,
        };
        let enrollment = EnrollmentRepo::enroll(&self.pool, &input).await?;
        if enrollment.is_some() {
            tracing::debug!(automation_id = automation.id, subscriber_id, "Subscriber enrolled");
        }
        Ok(enrollment)
    }

    /// Enroll `data.subscriber_id` in every active automation reacting to
    /// `trigger` whose conditions match `data`. Returns how many enrollments
    /// were created; existing enrollments are left alone.
    pub async fn handle_trigger_event(
        &self,
        trigger: TriggerType,
        data: &serde_json::Value,
    ) -> Result<u64, PipelineError> {
        let subscriber_id = data
            .get("subscriber_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| PipelineError::validation("subscriber_id is required"))?;
        if SubscriberRepo::find_by_id(&self.pool, subscriber_id)
            .await?
            .is_none()
        {
            return Err(PipelineError::not_found("Subscriber", subscriber_id));
        }

        let mut enrolled = 0;
        for automation in AutomationRepo::list_event_driven(&self.pool).await? {
            if !automation_matches(&automation, trigger, data) {
                continue;
            }
            if self
                .enroll(&automation, subscriber_id, data.clone())
                .await?
                .is_some()
            {
                enrolled += 1;
            }
        }

        tracing::info!(trigger = %trigger, subscriber_id, enrolled, "Trigger handled");
        Ok(enrolled)
    }

    /// One-email re-engagement automation. When active, every active
    /// subscriber without a recent open is enrolled right away.
    pub async fn create_reengagement_campaign(
        &self,
        request: &ReengagementRequest,
    ) -> Result<ReengagementResult, PipelineError> {
        let inactive_days = request.inactive_days.unwrap_or(DEFAULT_INACTIVE_DAYS).max(1);
        let subject = request
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| reengagement_subject(&request.name));

        let input = CreateAutomation {
            name: request.name.clone(),
            automation_type: AutomationType::Reengagement.as_str().to_string(),
            trigger_type: Some(TriggerType::Inactivity.as_str().to_string()),
            active: request.active,
            initial_delay_secs: 0,
            inactive_days: Some(inactive_days as i32),
            conditions: None,
            emails: vec![CreateAutomationEmail {
                subject,
                content: request.content.clone(),
                delay_secs: DEFAULT_STEP_DELAY_SECS,
            }],
        };
        let created = self.create_automation(&input).await?;
        let automation = created.automation;

        let mut enrolled = 0;
        if automation.active {
            let now = Utc::now();
            for (subscriber_id, last_opened_at) in
                SubscriberRepo::active_activity(&self.pool).await?
            {
                if !is_inactive(last_opened_at, inactive_days, now) {
                    continue;
                }
                let data = serde_json::json!({ "subscriber_id": subscriber_id });
                if self.enroll(&automation, subscriber_id, data).await?.is_some() {
                    enrolled += 1;
                }
            }
        }

        tracing::info!(automation_id = automation.id, enrolled, "Re-engagement campaign created");
        Ok(ReengagementResult {
            automation_id: automation.id,
            enrolled,
        })
    }

    /// Welcome sequence started by new subscriptions.
    pub async fn create_welcome_sequence(
        &self,
        request: &WelcomeRequest,
    ) -> Result<AutomationWithEmails, PipelineError> {
        let input = CreateAutomation {
            name: request.name.clone(),
            automation_type: AutomationType::Welcome.as_str().to_string(),
            trigger_type: Some(TriggerType::Subscription.as_str().to_string()),
            active: request.active,
            initial_delay_secs: request.initial_delay_secs,
            inactive_days: None,
            conditions: None,
            emails: request.emails.clone(),
        };
        self.create_automation(&input).await
    }

    // -----------------------------------------------------------------------
    // Advancer
    // -----------------------------------------------------------------------

    /// Send every due automation email once.
    ///
    /// Due enrollments are leased before sending, so concurrent passes never
    /// pick the same enrollment. The lease is renewed right before each send
    /// and every write afterwards presents it: a pass that outlived its lease
    /// skips the row instead of sending it a second time. A failed send
    /// releases the lease and keeps the position; the email is retried on a
    /// later pass.
    pub async fn process_automation_emails(&self) -> Result<AdvanceSummary, PipelineError> {
        let mut summary = AdvanceSummary::default();
        if !self.sender.mailer().is_configured() {
            tracing::debug!("Mail delivery not configured, skipping automation pass");
            return Ok(summary);
        }

        let now = Utc::now();
        let due = EnrollmentRepo::claim_due(&self.pool, now, lease_from(now), ADVANCE_BATCH_LIMIT)
            .await?;

        let mut cache = SequenceCache::new();
        for enrollment in due {
            let Some(mut lease) = enrollment.locked_until else {
                continue;
            };
            summary.processed += 1;
            let enrollment_id = enrollment.id;
            match self.advance(&enrollment, &mut lease, &mut cache).await {
                Ok(Step::Sent) => summary.sent += 1,
                Ok(Step::Failed) => summary.errors += 1,
                Ok(Step::Ended) => summary.ended += 1,
                Ok(Step::Skipped) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(enrollment_id, error = %e, "Failed to advance enrollment");
                    if let Err(e) = EnrollmentRepo::release(&self.pool, enrollment_id, lease).await {
                        tracing::error!(enrollment_id, error = %e, "Failed to release enrollment");
                    }
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                sent = summary.sent,
                errors = summary.errors,
                ended = summary.ended,
                "Automation pass finished",
            );
        }
        Ok(summary)
    }

    /// Handle one leased enrollment. `lease` tracks the lease currently held.
    async fn advance(
        &self,
        enrollment: &SubscriberAutomation,
        lease: &mut Timestamp,
        cache: &mut SequenceCache,
    ) -> Result<Step, PipelineError> {
        let Some(automation_id) = enrollment.automation_id else {
            return self.end(enrollment, *lease, END_AUTOMATION_DELETED).await;
        };
        if !cache.contains_key(&automation_id) {
            let sequence = match AutomationRepo::find_by_id(&self.pool, automation_id).await? {
                Some(automation) => {
                    let emails = AutomationRepo::list_emails(&self.pool, automation_id).await?;
                    Some((automation, emails))
                }
                None => None,
            };
            cache.insert(automation_id, sequence);
        }
        let Some((automation, emails)) = cache.get(&automation_id).and_then(Option::as_ref) else {
            return self.end(enrollment, *lease, END_AUTOMATION_DELETED).await;
        };

        // Paused automations keep their enrollments where they are.
        if !automation.active {
            EnrollmentRepo::release(&self.pool, enrollment.id, *lease).await?;
            return Ok(Step::Skipped);
        }

        let subscriber = match enrollment.subscriber_id {
            Some(id) => SubscriberRepo::find_by_id(&self.pool, id).await?,
            None => None,
        };
        let Some(subscriber) = subscriber else {
            return self.end(enrollment, *lease, END_SUBSCRIBER_DELETED).await;
        };
        if subscriber.status != SUBSCRIBER_ACTIVE {
            let reason = end_reason_for_subscriber_status(&subscriber.status);
            return self.end(enrollment, *lease, &reason).await;
        }

        let index = enrollment.current_email_index.max(0);
        let Some(email) = emails.get(index as usize) else {
            return self.end(enrollment, *lease, END_SEQUENCE_COMPLETED).await;
        };

        match EnrollmentRepo::renew_lease(&self.pool, enrollment.id, *lease, lease_from(Utc::now()))
            .await?
        {
            Some(renewed) => *lease = renewed,
            None => {
                tracing::warn!(
                    enrollment_id = enrollment.id,
                    "Enrollment lease expired before sending, skipped",
                );
                return Ok(Step::Skipped);
            }
        }

        let message = EmailMessage::for_automation_email(email);
        let outcome = self
            .sender
            .send_single_email(&message, &subscriber, None)
            .await;

        let log = CreateAutomationLog {
            automation_id,
            subscriber_id: subscriber.id,
            automation_email_id: email.id,
            success: outcome.is_sent(),
            error: match &outcome {
                SendOutcome::Sent => None,
                SendOutcome::Failed { error } => Some(error.clone()),
            },
        };
        EnrollmentRepo::log(&self.pool, &log).await?;

        if !outcome.is_sent() {
            EnrollmentRepo::release(&self.pool, enrollment.id, *lease).await?;
            return Ok(Step::Failed);
        }

        AutomationRepo::increment_emails_sent(&self.pool, automation_id).await?;
        let delays: Vec<i64> = emails.iter().map(|e| e.delay_secs).collect();
        let recorded = match advance_after_send(index, &delays, Utc::now()) {
            StepAdvance::Continue {
                next_index,
                next_email_at,
            } => {
                EnrollmentRepo::advance(
                    &self.pool,
                    enrollment.id,
                    *lease,
                    next_index,
                    next_email_at,
                    email.id,
                )
                .await?
            }
            StepAdvance::Complete { next_index } => {
                EnrollmentRepo::finish_sequence(
                    &self.pool,
                    enrollment.id,
                    *lease,
                    next_index,
                    email.id,
                )
                .await?
            }
        };
        if !recorded {
            tracing::warn!(
                enrollment_id = enrollment.id,
                email_id = email.id,
                "Enrollment lease lost while sending, position not advanced",
            );
        }
        Ok(Step::Sent)
    }

    async fn end(
        &self,
        enrollment: &SubscriberAutomation,
        lease: Timestamp,
        reason: &str,
    ) -> Result<Step, PipelineError> {
        if !EnrollmentRepo::complete(&self.pool, enrollment.id, lease, reason).await? {
            return Ok(Step::Skipped);
        }
        tracing::debug!(enrollment_id = enrollment.id, reason, "Enrollment ended");
        Ok(Step::Ended)
    }
}

/// End of a lease taken at `now`.
fn lease_from(now: Timestamp) -> Timestamp {
    now + Duration::seconds(ENROLLMENT_LEASE_SECS)
}

/// What one enrollment did during a pass.
enum Step {
    Sent,
    Failed,
    Ended,
    Skipped,
}

fn parse_trigger(raw: Option<&str>) -> Result<Option<TriggerType>, PipelineError> {
    raw.filter(|t| !t.is_empty())
        .map(str::parse::<TriggerType>)
        .transpose()
        .map_err(PipelineError::from)
}

fn validate_emails(emails: &[CreateAutomationEmail]) -> Result<(), PipelineError> {
    for (position, email) in emails.iter().enumerate() {
        if email.subject.trim().is_empty() || email.content.trim().is_empty() {
            return Err(PipelineError::validation(format!(
                "Email {} needs a subject and content",
                position + 1
            )));
        }
    }
    Ok(())
}

/// Whether a stored automation reacts to `trigger` with `data`.
///
/// Rows with an unknown type, trigger or malformed conditions never match.
fn automation_matches(automation: &Automation, trigger: TriggerType, data: &serde_json::Value) -> bool {
    let Ok(automation_type) = automation.automation_type.parse::<AutomationType>() else {
        return false;
    };
    let own_trigger = match automation.trigger_type.as_deref().map(str::parse::<TriggerType>) {
        Some(Ok(t)) => Some(t),
        Some(Err(_)) => return false,
        None => None,
    };
    if !reacts_to(automation_type, own_trigger, trigger) {
        return false;
    }
    match parse_conditions(&automation.conditions) {
        Ok(conditions) => conditions_match(&conditions, data),
        Err(_) => false,
    }
}
