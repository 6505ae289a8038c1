use chrono::{Duration, Utc};
use newsroom_db::models::automation::{
    CreateAutomation, CreateAutomationEmail, CreateEnrollment, UpdateAutomation,
};
use newsroom_db::models::subscriber::CreateSubscriber;
use newsroom_db::repositories::{AutomationRepo, EnrollmentRepo, SubscriberRepo};
use sqlx::PgPool;

fn email(subject: &str) -> CreateAutomationEmail {
    CreateAutomationEmail {
        subject: subject.to_string(),
        content: format!("<p>{subject}</p>"),
        delay_secs: 3600,
    }
}

fn drip(emails: Vec<CreateAutomationEmail>) -> CreateAutomation {
    CreateAutomation {
        name: "Onboarding".to_string(),
        automation_type: "drip".to_string(),
        trigger_type: None,
        active: true,
        initial_delay_secs: 0,
        inactive_days: None,
        conditions: None,
        emails,
    }
}

async fn subscriber(pool: &PgPool, email: &str) -> i64 {
    SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            email: email.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap()
    .id
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn emails_are_stored_in_order(pool: PgPool) {
    let created = AutomationRepo::create(
        &pool,
        &drip(vec![email("one"), email("two"), email("three")]),
        None,
    )
    .await
    .unwrap();

    let loaded = AutomationRepo::find_with_emails(&pool, created.automation.id)
        .await
        .unwrap()
        .unwrap();
    let subjects: Vec<_> = loaded.emails.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, ["one", "two", "three"]);
    let positions: Vec<_> = loaded.emails.iter().map(|e| e.position).collect();
    assert_eq!(positions, [0, 1, 2]);
    assert_eq!(loaded.automation.conditions, serde_json::json!([]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn subscriber_is_enrolled_at_most_once(pool: PgPool) {
    let automation = AutomationRepo::create(&pool, &drip(vec![email("one")]), None)
        .await
        .unwrap()
        .automation;
    let subscriber_id = subscriber(&pool, "a@example.com").await;
    let input = CreateEnrollment {
        automation_id: automation.id,
        subscriber_id,
        next_email_at: Utc::now(),
        custom_data: serde_json::json!({}),
    };

    assert!(EnrollmentRepo::enroll(&pool, &input).await.unwrap().is_some());
    assert!(EnrollmentRepo::enroll(&pool, &input).await.unwrap().is_none());
    assert_eq!(
        EnrollmentRepo::list_for_automation(&pool, automation.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claimed_enrollments_are_leased(pool: PgPool) {
    let automation = AutomationRepo::create(&pool, &drip(vec![email("one")]), None)
        .await
        .unwrap()
        .automation;
    let now = Utc::now();
    for address in ["a@example.com", "b@example.com"] {
        let subscriber_id = subscriber(&pool, address).await;
        EnrollmentRepo::enroll(
            &pool,
            &CreateEnrollment {
                automation_id: automation.id,
                subscriber_id,
                next_email_at: now - Duration::minutes(1),
                custom_data: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
    }

    let lease = now + Duration::minutes(5);
    let first = EnrollmentRepo::claim_due(&pool, now, lease, 10).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = EnrollmentRepo::claim_due(&pool, now, lease, 10).await.unwrap();
    assert!(second.is_empty());

    let held = first[0].locked_until.unwrap();
    assert!(EnrollmentRepo::release(&pool, first[0].id, held).await.unwrap());
    let third = EnrollmentRepo::claim_due(&pool, now, lease, 10).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].id, first[0].id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_lease_cannot_write(pool: PgPool) {
    let automation = AutomationRepo::create(&pool, &drip(vec![email("one"), email("two")]), None)
        .await
        .unwrap();
    let subscriber_id = subscriber(&pool, "a@example.com").await;
    let now = Utc::now();
    EnrollmentRepo::enroll(
        &pool,
        &CreateEnrollment {
            automation_id: automation.automation.id,
            subscriber_id,
            next_email_at: now - Duration::minutes(1),
            custom_data: serde_json::json!({}),
        },
    )
    .await
    .unwrap();

    let first = EnrollmentRepo::claim_due(&pool, now, now + Duration::minutes(5), 10)
        .await
        .unwrap();
    let stale = first[0].locked_until.unwrap();

    // The first lease runs out and a later pass takes the row over.
    let later = now + Duration::minutes(10);
    let second = EnrollmentRepo::claim_due(&pool, later, later + Duration::minutes(5), 10)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    let current = second[0].locked_until.unwrap();

    let id = first[0].id;
    let email_id = automation.emails[0].id;
    assert!(EnrollmentRepo::renew_lease(&pool, id, stale, later)
        .await
        .unwrap()
        .is_none());
    assert!(!EnrollmentRepo::advance(&pool, id, stale, 1, later, email_id)
        .await
        .unwrap());
    assert!(!EnrollmentRepo::finish_sequence(&pool, id, stale, 1, email_id)
        .await
        .unwrap());
    assert!(!EnrollmentRepo::release(&pool, id, stale).await.unwrap());
    assert!(!EnrollmentRepo::complete(&pool, id, stale, "completed")
        .await
        .unwrap());

    let renewed = EnrollmentRepo::renew_lease(&pool, id, current, later + Duration::minutes(6))
        .await
        .unwrap()
        .unwrap();
    assert!(EnrollmentRepo::advance(&pool, id, renewed, 1, later, email_id)
        .await
        .unwrap());
    let row = EnrollmentRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.current_email_index, 1);
    assert!(row.locked_until.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replacing_emails_clamps_enrollment_progress(pool: PgPool) {
    let automation = AutomationRepo::create(
        &pool,
        &drip(vec![email("one"), email("two"), email("three")]),
        None,
    )
    .await
    .unwrap();
    let subscriber_id = subscriber(&pool, "a@example.com").await;
    let enrollment = EnrollmentRepo::enroll(
        &pool,
        &CreateEnrollment {
            automation_id: automation.automation.id,
            subscriber_id,
            next_email_at: Utc::now(),
            custom_data: serde_json::json!({}),
        },
    )
    .await
    .unwrap()
    .unwrap();
    let claimed = EnrollmentRepo::claim_due(&pool, Utc::now(), Utc::now() + Duration::minutes(5), 10)
        .await
        .unwrap();
    assert_eq!(claimed[0].id, enrollment.id);
    let advanced = EnrollmentRepo::advance(
        &pool,
        enrollment.id,
        claimed[0].locked_until.unwrap(),
        3,
        Utc::now(),
        automation.emails[2].id,
    )
    .await
    .unwrap();
    assert!(advanced);

    let update = UpdateAutomation {
        emails: Some(vec![email("only")]),
        ..Default::default()
    };
    let updated = AutomationRepo::update(&pool, automation.automation.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.emails.len(), 1);

    let row = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.current_email_index, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleting_an_automation_detaches_enrollments(pool: PgPool) {
    let automation = AutomationRepo::create(&pool, &drip(vec![email("one")]), None)
        .await
        .unwrap()
        .automation;
    let subscriber_id = subscriber(&pool, "a@example.com").await;
    let enrollment = EnrollmentRepo::enroll(
        &pool,
        &CreateEnrollment {
            automation_id: automation.id,
            subscriber_id,
            next_email_at: Utc::now(),
            custom_data: serde_json::json!({}),
        },
    )
    .await
    .unwrap()
    .unwrap();

    assert!(AutomationRepo::delete(&pool, automation.id).await.unwrap());

    let row = EnrollmentRepo::find_by_id(&pool, enrollment.id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.automation_id.is_none());
    assert_eq!(row.status, "active");
}
