mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use newsroom_core::error::CoreError;
use newsroom_db::models::newsletter::CreateNewsletter;
use newsroom_db::repositories::{NewsletterRepo, SendJobRepo};
use newsroom_pipeline::{BatchOptions, PipelineError, ScheduledDispatch};
use sqlx::PgPool;

use common::{sender, subscriber};

fn newsletter_input() -> CreateNewsletter {
    CreateNewsletter {
        title: "October issue".into(),
        subject: "What's new".into(),
        content: r#"<p>Read <a href="https://example.com/post">the post</a> or
            <a href="mailto:editor@example.com">write us</a>.</p>"#
            .into(),
        ..Default::default()
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn batch_send_accounts_for_every_recipient(pool: PgPool) {
    let (sender, mailer) = sender(&pool);
    let mut ids = Vec::new();
    for email in [
        "a@example.com",
        "b@example.com",
        "hard@example.com",
        "c@example.com",
        "soft@example.com",
    ] {
        ids.push(subscriber(&pool, email).await.id);
    }
    // Unknown ids are skipped.
    ids.push(999_999);

    let newsletter = NewsletterRepo::create(&pool, &newsletter_input(), "draft", None)
        .await
        .unwrap();
    let options = BatchOptions {
        batch_size: Some(2),
        delay: Some(Duration::ZERO),
    };
    let job = sender
        .send_batch_emails(newsletter.id, &ids, options)
        .await
        .unwrap();

    assert_eq!(job.status, "completed");
    assert_eq!(job.total_subscribers, 5);
    assert_eq!(job.total_batches, 3);
    assert_eq!(job.sent_count, 3);
    assert_eq!(job.failed_count, 2);
    assert_eq!(job.sent_count + job.failed_count, job.total_subscribers);
    assert_eq!(mailer.sent_to().len(), 3);

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.status, "sent");
    assert_eq!(newsletter.sent_count, 3);

    let failures: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM email_deliveries WHERE status = 'failed' AND send_job_id = $1",
    )
    .bind(job.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(failures, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sent_email_carries_tracking(pool: PgPool) {
    let (sender, mailer) = sender(&pool);
    let ada = subscriber(&pool, "ada@example.com").await;
    let newsletter = NewsletterRepo::create(&pool, &newsletter_input(), "draft", None)
        .await
        .unwrap();

    sender
        .send_batch_emails(newsletter.id, &[ada.id], BatchOptions::default())
        .await
        .unwrap();

    let sent = mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let html = &sent[0].html;
    assert!(html.contains("https://news.example.com/api/track/click/"));
    assert!(html.contains("https://news.example.com/api/track/open/"));
    assert!(html.contains("mailto:editor@example.com"));
    assert!(!html.contains("https://example.com/post"));
    assert_eq!(sent[0].to_name, "Subscriber");

    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT kind, original_url FROM tracking_events WHERE subscriber_id = $1 ORDER BY kind",
    )
    .bind(ada.id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            ("click".to_string(), Some("https://example.com/post".to_string())),
            ("open".to_string(), None),
        ]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn newsletter_is_sent_only_once(pool: PgPool) {
    let (sender, _mailer) = sender(&pool);
    subscriber(&pool, "a@example.com").await;
    let newsletter = NewsletterRepo::create(&pool, &newsletter_input(), "draft", None)
        .await
        .unwrap();

    let batch = sender
        .start_newsletter_send(newsletter.id, BatchOptions::default())
        .await
        .unwrap();

    let second = sender
        .start_newsletter_send(newsletter.id, BatchOptions::default())
        .await;
    assert_matches!(second, Err(PipelineError::Core(CoreError::Conflict(_))));

    sender.run_batch(batch).await.unwrap();
    let again = sender
        .start_newsletter_send(newsletter.id, BatchOptions::default())
        .await;
    assert_matches!(again, Err(PipelineError::Core(CoreError::Conflict(_))));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_audience_releases_the_claim(pool: PgPool) {
    let (sender, _mailer) = sender(&pool);
    let newsletter = NewsletterRepo::create(&pool, &newsletter_input(), "draft", None)
        .await
        .unwrap();

    let result = sender
        .start_newsletter_send(newsletter.id, BatchOptions::default())
        .await;
    assert_matches!(
        result,
        Err(PipelineError::Core(CoreError::Validation(msg))) if msg == "No valid subscribers found"
    );

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.status, "draft");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_newsletter_is_not_found(pool: PgPool) {
    let (sender, _mailer) = sender(&pool);
    let result = sender
        .start_newsletter_send(42, BatchOptions::default())
        .await;
    assert_matches!(
        result,
        Err(PipelineError::Core(CoreError::NotFound { entity: "Newsletter", id: 42 }))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn due_scheduled_newsletter_is_dispatched(pool: PgPool) {
    let (sender, mailer) = sender(&pool);
    subscriber(&pool, "a@example.com").await;
    let mut input = newsletter_input();
    input.scheduled_at = Some(Utc::now() - chrono::Duration::minutes(1));
    let newsletter = NewsletterRepo::create(&pool, &input, "scheduled", None)
        .await
        .unwrap();

    let dispatch = ScheduledDispatch::new(pool.clone(), sender.clone());
    let prepared = dispatch.claim_due().await.unwrap();
    assert_eq!(prepared.len(), 1);
    assert!(dispatch.claim_due().await.unwrap().is_empty());

    for batch in prepared {
        sender.run_batch(batch).await.unwrap();
    }
    assert_eq!(mailer.sent_to(), vec!["a@example.com".to_string()]);
    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.status, "sent");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn scheduled_newsletter_without_audience_returns_to_draft(pool: PgPool) {
    let (sender, _mailer) = sender(&pool);
    let mut input = newsletter_input();
    input.scheduled_at = Some(Utc::now() - chrono::Duration::minutes(1));
    let newsletter = NewsletterRepo::create(&pool, &input, "scheduled", None)
        .await
        .unwrap();

    let dispatch = ScheduledDispatch::new(pool.clone(), sender);
    assert!(dispatch.claim_due().await.unwrap().is_empty());

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.status, "draft");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn shutdown_interrupts_a_send_that_resumes_later(pool: PgPool) {
    let (sender, mailer) = sender(&pool);
    for email in ["a@example.com", "b@example.com"] {
        subscriber(&pool, email).await;
    }
    let newsletter = NewsletterRepo::create(&pool, &newsletter_input(), "draft", None)
        .await
        .unwrap();

    let options = BatchOptions {
        batch_size: Some(1),
        delay: Some(Duration::from_secs(3600)),
    };
    let batch = sender
        .start_newsletter_send(newsletter.id, options)
        .await
        .unwrap();
    let job_id = batch.job.id;
    sender.spawn_batch(batch);

    // Stop once the first batch is out and the send is pausing.
    for _ in 0..50 {
        let job = SendJobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
        if job.sent_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::timeout(Duration::from_secs(5), sender.shutdown())
        .await
        .expect("send did not stop at the batch boundary");

    let job = SendJobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.error.as_deref(), Some("Send interrupted by shutdown"));
    assert_eq!(job.sent_count, 1);
    let stored = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "draft");

    // Sending again only reaches the recipient still missing.
    let (resumed, resumed_mailer) = common::sender(&pool);
    let batch = resumed
        .start_newsletter_send(newsletter.id, BatchOptions::default())
        .await
        .unwrap();
    assert_eq!(batch.job.total_subscribers, 1);
    resumed.run_batch(batch).await.unwrap();

    let mut recipients = mailer.sent_to();
    recipients.extend(resumed_mailer.sent_to());
    recipients.sort();
    assert_eq!(recipients, ["a@example.com", "b@example.com"]);
    let stored = NewsletterRepo::find_by_id(&pool, newsletter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "sent");
    assert_eq!(stored.sent_count, 2);
}
