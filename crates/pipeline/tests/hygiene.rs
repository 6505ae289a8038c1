mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use newsroom_db::models::newsletter::CreateNewsletter;
use newsroom_db::repositories::{NewsletterRepo, SubscriberRepo};
use newsroom_pipeline::hygiene::{clean_subscriber_list, process_bounces};
use newsroom_pipeline::{BatchOptions, Sender};
use sqlx::PgPool;

use common::{sender, subscriber, test_config, RejectedAccountMailer};

async fn send_to(pool: &PgPool, ids: &[i64]) {
    let (sender, _mailer) = sender(pool);
    send_with(&sender, pool, ids).await;
}

async fn send_with(sender: &Sender, pool: &PgPool, ids: &[i64]) {
    let newsletter = NewsletterRepo::create(
        pool,
        &CreateNewsletter {
            title: "Issue".into(),
            subject: "Hello".into(),
            content: "<p>Hi</p>".into(),
            ..Default::default()
        },
        "draft",
        None,
    )
    .await
    .unwrap();
    sender
        .send_batch_emails(newsletter.id, ids, BatchOptions::default())
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn hard_bounce_marks_subscriber_bounced(pool: PgPool) {
    let hard = subscriber(&pool, "hard@example.com").await;
    let ok = subscriber(&pool, "ok@example.com").await;
    send_to(&pool, &[hard.id, ok.id]).await;

    let summary = process_bounces(&pool).await.unwrap();
    assert_eq!(summary.hard_bounces, 1);
    assert_eq!(summary.soft_bounces, 0);

    let hard = SubscriberRepo::find_by_id(&pool, hard.id).await.unwrap().unwrap();
    assert_eq!(hard.status, "bounced");
    assert_eq!(
        hard.bounce_reason.as_deref(),
        Some("Hard bounce - invalid email address")
    );

    // Already processed.
    let again = process_bounces(&pool).await.unwrap();
    assert_eq!(again.hard_bounces + again.soft_bounces, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn third_soft_bounce_counts_as_hard(pool: PgPool) {
    let soft = subscriber(&pool, "soft@example.com").await;

    for expected in 1..=2 {
        send_to(&pool, &[soft.id]).await;
        let summary = process_bounces(&pool).await.unwrap();
        assert_eq!(summary.soft_bounces, 1);
        let current = SubscriberRepo::find_by_id(&pool, soft.id).await.unwrap().unwrap();
        assert_eq!(current.soft_bounce_count, expected);
        assert_eq!(current.status, "active");
    }

    send_to(&pool, &[soft.id]).await;
    let summary = process_bounces(&pool).await.unwrap();
    assert_eq!(summary.hard_bounces, 1);
    let current = SubscriberRepo::find_by_id(&pool, soft.id).await.unwrap().unwrap();
    assert_eq!(current.status, "bounced");
    assert_eq!(current.bounce_reason.as_deref(), Some("Multiple soft bounces"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleaning_removes_and_deactivates(pool: PgPool) {
    let gone = subscriber(&pool, "gone@example.com").await;
    SubscriberRepo::unsubscribe(&pool, &gone.email).await.unwrap();
    let stale = subscriber(&pool, "stale@example.com").await;
    sqlx::query("UPDATE subscribers SET last_opened_at = $2 WHERE id = $1")
        .bind(stale.id)
        .bind(Utc::now() - Duration::days(200))
        .execute(&pool)
        .await
        .unwrap();
    let fresh = subscriber(&pool, "fresh@example.com").await;

    let summary = clean_subscriber_list(&pool).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.updated, 1);

    assert!(SubscriberRepo::find_by_id(&pool, gone.id).await.unwrap().is_none());
    let archived: String =
        sqlx::query_scalar("SELECT reason FROM removed_subscribers WHERE original_id = $1")
            .bind(gone.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(archived, "unsubscribed");

    let stale = SubscriberRepo::find_by_id(&pool, stale.id).await.unwrap().unwrap();
    assert_eq!(stale.status, "inactive");
    assert_eq!(stale.inactive_reason.as_deref(), Some("No opens for 6+ months"));

    let fresh = SubscriberRepo::find_by_id(&pool, fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, "active");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn account_rejection_is_not_a_bounce(pool: PgPool) {
    let sender = Sender::new(
        pool.clone(),
        Arc::new(RejectedAccountMailer),
        test_config(),
    );
    let mut ids = Vec::new();
    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        ids.push(subscriber(&pool, email).await.id);
    }
    send_with(&sender, &pool, &ids).await;

    let failed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM email_deliveries WHERE status = 'failed'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(failed, 3);

    let summary = process_bounces(&pool).await.unwrap();
    assert_eq!(summary.hard_bounces + summary.soft_bounces, 0);
    let cleanup = clean_subscriber_list(&pool).await.unwrap();
    assert_eq!(cleanup.removed, 0);

    for id in ids {
        let current = SubscriberRepo::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(current.status, "active");
        assert_eq!(current.soft_bounce_count, 0);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn relay_outages_never_count_as_soft_bounces(pool: PgPool) {
    let flaky = subscriber(&pool, "outage@example.com").await;

    for _ in 0..4 {
        send_to(&pool, &[flaky.id]).await;
        let summary = process_bounces(&pool).await.unwrap();
        assert_eq!(summary.soft_bounces, 0);
    }

    let current = SubscriberRepo::find_by_id(&pool, flaky.id).await.unwrap().unwrap();
    assert_eq!(current.status, "active");
    assert_eq!(current.soft_bounce_count, 0);
}
