mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use newsroom_core::automation::TriggerType;
use newsroom_core::error::CoreError;
use newsroom_db::models::automation::{CreateAutomation, CreateAutomationEmail};
use newsroom_db::models::subscriber::UpdateSubscriber;
use newsroom_db::repositories::{AutomationRepo, EnrollmentRepo, SubscriberRepo};
use newsroom_events::{MailError, Mailer, OutgoingEmail};
use newsroom_pipeline::automation::{ReengagementRequest, WelcomeRequest};
use newsroom_pipeline::{AutomationEngine, PipelineError, Sender};
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Notify;

use common::{sender, subscriber, test_config, TestMailer};

fn step(subject: &str, delay_secs: i64) -> CreateAutomationEmail {
    CreateAutomationEmail {
        subject: subject.into(),
        content: format!("<p>{subject}</p>"),
        delay_secs,
    }
}

fn drip(active: bool, emails: Vec<CreateAutomationEmail>) -> CreateAutomation {
    CreateAutomation {
        name: "Onboarding".into(),
        automation_type: "drip".into(),
        trigger_type: None,
        active,
        initial_delay_secs: 0,
        inactive_days: None,
        conditions: None,
        emails,
    }
}

fn engine(pool: &PgPool) -> (AutomationEngine, std::sync::Arc<TestMailer>) {
    let (sender, mailer) = sender(pool);
    (AutomationEngine::new(pool.clone(), sender), mailer)
}

/// Make every active enrollment due now.
async fn make_due(pool: &PgPool) {
    sqlx::query("UPDATE subscriber_automations SET next_email_at = $1 WHERE status = 'active'")
        .bind(Utc::now() - Duration::seconds(1))
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_type_or_name_is_rejected(pool: PgPool) {
    let (engine, _) = engine(&pool);

    let mut bad_type = drip(true, vec![]);
    bad_type.automation_type = "broadcast".into();
    assert_matches!(
        engine.create_automation(&bad_type).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );

    let mut no_name = drip(true, vec![]);
    no_name.name = "  ".into();
    assert_matches!(
        engine.create_automation(&no_name).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enrollment_rules(pool: PgPool) {
    let (engine, _) = engine(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;

    let inactive = engine
        .create_automation(&drip(false, vec![step("One", 0)]))
        .await
        .unwrap();
    assert_matches!(
        engine
            .add_subscriber_to_automation(inactive.automation.id, ada.id, json!({}))
            .await,
        Err(PipelineError::Core(CoreError::Validation(msg))) if msg == "Automation is not active"
    );

    assert_matches!(
        engine.add_subscriber_to_automation(9_999, ada.id, json!({})).await,
        Err(PipelineError::Core(CoreError::NotFound { entity: "Automation", .. }))
    );

    let active = engine
        .create_automation(&drip(true, vec![step("One", 0)]))
        .await
        .unwrap();
    engine
        .add_subscriber_to_automation(active.automation.id, ada.id, json!({}))
        .await
        .unwrap();
    assert_matches!(
        engine
            .add_subscriber_to_automation(active.automation.id, ada.id, json!({}))
            .await,
        Err(PipelineError::Core(CoreError::Conflict(_)))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sequence_runs_to_completion_without_overrunning(pool: PgPool) {
    let (engine, mailer) = engine(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;
    let automation = engine
        .create_automation(&drip(true, vec![step("One", 0), step("Two", 3600)]))
        .await
        .unwrap();
    let enrollment = engine
        .add_subscriber_to_automation(automation.automation.id, ada.id, json!({}))
        .await
        .unwrap();

    let first = engine.process_automation_emails().await.unwrap();
    assert_eq!(first.sent, 1);
    let after_first = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_first.current_email_index, 1);
    assert_eq!(after_first.status, "active");
    assert!(after_first.next_email_at.unwrap() > Utc::now() + Duration::minutes(50));

    // Not due yet.
    assert_eq!(engine.process_automation_emails().await.unwrap().processed, 0);

    for _ in 0..3 {
        make_due(&pool).await;
        engine.process_automation_emails().await.unwrap();
    }

    let done = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.end_reason.as_deref(), Some("sequence_completed"));
    assert!(done.current_email_index <= 2);
    assert_eq!(mailer.sent_to().len(), 2);

    let stored = AutomationRepo::find_by_id(&pool, automation.automation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.emails_sent, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_send_keeps_position(pool: PgPool) {
    let (engine, _) = engine(&pool);
    let soft = subscriber(&pool, "soft@example.com").await;
    let automation = engine
        .create_automation(&drip(true, vec![step("One", 0)]))
        .await
        .unwrap();
    let enrollment = engine
        .add_subscriber_to_automation(automation.automation.id, soft.id, json!({}))
        .await
        .unwrap();

    let summary = engine.process_automation_emails().await.unwrap();
    assert_eq!(summary.errors, 1);

    let after = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.current_email_index, 0);
    assert_eq!(after.status, "active");
    assert!(after.locked_until.is_none());

    let logs = EnrollmentRepo::list_logs(&pool, automation.automation.id, 10)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enrollment_ends_when_subscriber_leaves(pool: PgPool) {
    let (engine, mailer) = engine(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;
    let automation = engine
        .create_automation(&drip(true, vec![step("One", 0)]))
        .await
        .unwrap();
    let enrollment = engine
        .add_subscriber_to_automation(automation.automation.id, ada.id, json!({}))
        .await
        .unwrap();

    SubscriberRepo::update(
        &pool,
        ada.id,
        &UpdateSubscriber {
            status: Some("unsubscribed".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let summary = engine.process_automation_emails().await.unwrap();
    assert_eq!(summary.ended, 1);
    assert!(mailer.sent_to().is_empty());

    let ended = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ended.end_reason.as_deref(), Some("subscriber_unsubscribed"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleted_automation_ends_enrollments(pool: PgPool) {
    let (engine, _) = engine(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;
    let automation = engine
        .create_automation(&drip(true, vec![step("One", 0)]))
        .await
        .unwrap();
    let enrollment = engine
        .add_subscriber_to_automation(automation.automation.id, ada.id, json!({}))
        .await
        .unwrap();

    engine
        .delete_automation(automation.automation.id)
        .await
        .unwrap();
    engine.process_automation_emails().await.unwrap();

    let ended = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ended.status, "completed");
    assert_eq!(ended.end_reason.as_deref(), Some("automation_deleted"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn trigger_event_enrolls_matching_automations(pool: PgPool) {
    let (engine, _) = engine(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;

    let mut vip = drip(true, vec![step("Welcome VIP", 0)]);
    vip.automation_type = "trigger".into();
    vip.trigger_type = Some("tag_added".into());
    vip.conditions = Some(json!([{ "field": "tag", "value": "vip" }]));
    engine.create_automation(&vip).await.unwrap();

    let welcome = engine
        .create_welcome_sequence(&WelcomeRequest {
            name: "Welcome".into(),
            emails: vec![step("Hello", 0)],
            initial_delay_secs: 0,
            active: true,
        })
        .await
        .unwrap();
    assert_eq!(welcome.automation.trigger_type.as_deref(), Some("subscription"));

    let data = json!({ "subscriber_id": ada.id, "tag": "news" });
    assert_eq!(
        engine
            .handle_trigger_event(TriggerType::TagAdded, &data)
            .await
            .unwrap(),
        0
    );

    let data = json!({ "subscriber_id": ada.id, "tag": "vip" });
    assert_eq!(
        engine
            .handle_trigger_event(TriggerType::TagAdded, &data)
            .await
            .unwrap(),
        1
    );
    // Already enrolled.
    assert_eq!(
        engine
            .handle_trigger_event(TriggerType::TagAdded, &data)
            .await
            .unwrap(),
        0
    );

    let data = json!({ "subscriber_id": ada.id });
    assert_eq!(
        engine
            .handle_trigger_event(TriggerType::Subscription, &data)
            .await
            .unwrap(),
        1
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reengagement_enrolls_inactive_subscribers(pool: PgPool) {
    let (engine, _) = engine(&pool);
    let never_opened = subscriber(&pool, "quiet@example.com").await;
    let recent = subscriber(&pool, "reader@example.com").await;
    SubscriberRepo::record_open(&pool, recent.id).await.unwrap();

    let result = engine
        .create_reengagement_campaign(&ReengagementRequest {
            name: "Come back".into(),
            content: "<p>We miss you</p>".into(),
            subject: None,
            inactive_days: None,
            active: true,
        })
        .await
        .unwrap();
    assert_eq!(result.enrolled, 1);

    let automation = engine.get_automation(result.automation_id).await.unwrap();
    assert_eq!(automation.automation.automation_type, "reengagement");
    assert_eq!(automation.emails.len(), 1);
    assert_eq!(automation.emails[0].subject, "We miss you! Come back");

    let enrolled = EnrollmentRepo::list_for_automation(&pool, result.automation_id)
        .await
        .unwrap();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].subscriber_id, Some(never_opened.id));
}

/// Holds the first send open until the test lets it finish.
struct StallingMailer {
    sent: Mutex<Vec<String>>,
    stall_next: AtomicBool,
    stalled: Notify,
    resume: Notify,
}

impl StallingMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            stall_next: AtomicBool::new(true),
            stalled: Notify::new(),
            resume: Notify::new(),
        }
    }

    fn count_to(&self, address: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|a| *a == address).count()
    }
}

#[async_trait]
impl Mailer for StallingMailer {
    fn provider(&self) -> &'static str {
        "test"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.stall_next.swap(false, Ordering::SeqCst) {
            self.stalled.notify_one();
            self.resume.notified().await;
        }
        self.sent.lock().unwrap().push(email.to_email.clone());
        Ok(())
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn overlapping_passes_send_each_step_once(pool: PgPool) {
    let mailer = Arc::new(StallingMailer::new());
    let engine = AutomationEngine::new(
        pool.clone(),
        Sender::new(pool.clone(), mailer.clone(), test_config()),
    );
    let automation = engine
        .create_automation(&drip(true, vec![step("One", 0), step("Two", 3600)]))
        .await
        .unwrap();

    let mut enrollments = Vec::new();
    for (address, minutes_ago) in [("slow@example.com", 2), ("zz@example.com", 1)] {
        let subscriber = subscriber(&pool, address).await;
        let enrollment = engine
            .add_subscriber_to_automation(automation.automation.id, subscriber.id, json!({}))
            .await
            .unwrap();
        sqlx::query("UPDATE subscriber_automations SET next_email_at = $2 WHERE id = $1")
            .bind(enrollment.id)
            .bind(Utc::now() - Duration::minutes(minutes_ago))
            .execute(&pool)
            .await
            .unwrap();
        enrollments.push(enrollment.id);
    }

    // The first pass stalls inside its first send.
    let first_pass = tokio::spawn({
        let engine = engine.clone();
        async move { engine.process_automation_emails().await }
    });
    mailer.stalled.notified().await;

    // Its leases run out while it is stuck, and a second pass takes over.
    sqlx::query(
        "UPDATE subscriber_automations SET locked_until = NOW() - INTERVAL '1 second'
         WHERE locked_until IS NOT NULL",
    )
    .execute(&pool)
    .await
    .unwrap();
    let second = engine.process_automation_emails().await.unwrap();
    assert_eq!(second.sent, 2);

    mailer.resume.notify_one();
    first_pass.await.unwrap().unwrap();

    assert_eq!(mailer.count_to("zz@example.com"), 1);
    for id in enrollments {
        let row = EnrollmentRepo::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.current_email_index, 1);
        assert!(row.locked_until.is_none());
    }
}
