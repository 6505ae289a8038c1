use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use newsroom_core::status::SUBSCRIBER_UNSUBSCRIBED;
use newsroom_db::models::newsletter::CreateNewsletter;
use newsroom_db::models::subscriber::{CreateSubscriber, Subscriber, UpdateSubscriber};
use newsroom_db::repositories::{NewsletterRepo, SendJobRepo, SubscriberRepo};
use newsroom_events::{MailError, Mailer, OutgoingEmail};
use newsroom_pipeline::{DeliveryConfig, ScheduledDispatch, Sender};
use newsroom_worker::jobs::{hygiene, scheduled};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn provider(&self) -> &'static str {
        "test"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.to_email.clone());
        Ok(())
    }
}

async fn subscriber(pool: &PgPool, email: &str) -> Subscriber {
    SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            email: email.into(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_runs_on_start_and_stops_on_cancel(pool: PgPool) {
    let subscriber = subscriber(&pool, "gone@example.com").await;
    SubscriberRepo::update(
        &pool,
        subscriber.id,
        &UpdateSubscriber {
            status: Some(SUBSCRIBER_UNSUBSCRIBED.into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(hygiene::run_cleanup(
        pool.clone(),
        Duration::from_secs(3600),
        cancel.clone(),
    ));

    // The first tick fires immediately.
    let mut removed = false;
    for _ in 0..50 {
        if SubscriberRepo::find_by_id(&pool, subscriber.id)
            .await
            .unwrap()
            .is_none()
        {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(removed, "unsubscribed subscriber was not cleaned up");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cleanup loop did not stop")
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bounce_loop_stops_when_cancelled_before_start(pool: PgPool) {
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(
        Duration::from_secs(5),
        hygiene::run_bounces(pool, Duration::from_secs(60), cancel),
    )
    .await
    .expect("bounce loop ignored cancellation");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn abandoned_scheduled_send_is_resumed(pool: PgPool) {
    let first = subscriber(&pool, "first@example.com").await;
    subscriber(&pool, "second@example.com").await;
    let newsletter = NewsletterRepo::create(
        &pool,
        &CreateNewsletter {
            title: "Issue".into(),
            subject: "Weekly".into(),
            content: "<p>Hi</p>".into(),
            ..Default::default()
        },
        "sending",
        None,
    )
    .await
    .unwrap();
    sqlx::query("UPDATE newsletters SET scheduled_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(newsletter.id)
        .execute(&pool)
        .await
        .unwrap();

    // A previous process reached the first recipient, then died.
    sqlx::query(
        "INSERT INTO email_deliveries (newsletter_id, subscriber_id, status, provider)
         VALUES ($1, $2, 'sent', 'smtp')",
    )
    .bind(newsletter.id)
    .bind(first.id)
    .execute(&pool)
    .await
    .unwrap();
    let stale_job: i64 = sqlx::query_scalar(
        "INSERT INTO send_jobs
            (newsletter_id, total_subscribers, sent_count, batch_size, delay_secs,
             current_batch, total_batches, updated_at)
         VALUES ($1, 2, 1, 1, 120, 1, 2, NOW() - INTERVAL '1 hour')
         RETURNING id",
    )
    .bind(newsletter.id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let config = DeliveryConfig {
        app_url: "https://news.example.com".into(),
        batch_delay: Duration::ZERO,
        ..DeliveryConfig::default()
    };
    let sender = Sender::new(pool.clone(), mailer.clone(), config);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduled::run(
        ScheduledDispatch::new(pool.clone(), sender.clone()),
        Duration::from_secs(3600),
        cancel.clone(),
    ));

    let mut status = String::new();
    for _ in 0..50 {
        status = NewsletterRepo::find_by_id(&pool, newsletter.id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status == "sent" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, "sent");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatch loop did not stop")
        .unwrap();
    sender.shutdown().await;

    let stale = SendJobRepo::find_by_id(&pool, stale_job).await.unwrap().unwrap();
    assert_eq!(stale.status, "failed");
    assert!(stale.error.unwrap().contains("abandoned"));
    assert_eq!(*mailer.sent.lock().unwrap(), ["second@example.com"]);
}
