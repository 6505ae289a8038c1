mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use newsroom_db::models::newsletter::CreateNewsletter;
use newsroom_db::repositories::{NewsletterRepo, SubscriberRepo};
use newsroom_events::bus::{EMAIL_OPENED, LINK_CLICKED};
use newsroom_events::EventBus;
use newsroom_pipeline::{Analytics, BatchOptions, PipelineError};
use sqlx::PgPool;
use uuid::Uuid;

use common::{sender, subscriber};

async fn tracking_id(pool: &PgPool, kind: &str) -> Uuid {
    sqlx::query_scalar("SELECT tracking_id FROM tracking_events WHERE kind = $1 LIMIT 1")
        .bind(kind)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn send_one(pool: &PgPool) -> (i64, i64) {
    let (sender, _mailer) = sender(pool);
    let ada = subscriber(pool, "ada@example.com").await;
    let newsletter = NewsletterRepo::create(
        pool,
        &CreateNewsletter {
            title: "Issue, with comma".into(),
            subject: "Hello".into(),
            content: r#"<a href="https://example.com/a">A</a>"#.into(),
            ..Default::default()
        },
        "draft",
        None,
    )
    .await
    .unwrap();
    sender
        .send_batch_emails(newsletter.id, &[ada.id], BatchOptions::default())
        .await
        .unwrap();
    (newsletter.id, ada.id)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn open_and_click_update_counters(pool: PgPool) {
    let (newsletter_id, subscriber_id) = send_one(&pool).await;
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let analytics = Analytics::new(pool.clone(), bus.clone());

    let open = tracking_id(&pool, "open").await;
    analytics.record_open(open).await.unwrap();
    analytics.record_open(open).await.unwrap();

    let url = analytics
        .record_click(tracking_id(&pool, "click").await)
        .await
        .unwrap();
    assert_eq!(url, "https://example.com/a");

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.open_count, 2);
    assert_eq!(newsletter.click_count, 1);

    let subscriber = SubscriberRepo::find_by_id(&pool, subscriber_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.open_count, 2);
    assert_eq!(subscriber.click_count, 1);
    assert!(subscriber.last_opened_at.is_some());
    let score = subscriber.engagement_score.unwrap();
    assert!((0..=100).contains(&score));

    assert_eq!(rx.recv().await.unwrap().event_type, EMAIL_OPENED);
    assert_eq!(rx.recv().await.unwrap().event_type, EMAIL_OPENED);
    let click = rx.recv().await.unwrap();
    assert_eq!(click.event_type, LINK_CLICKED);
    assert_eq!(click.payload["url"], "https://example.com/a");
    assert_eq!(click.subscriber_id, Some(subscriber_id));

    let metrics = analytics.newsletter_analytics(newsletter_id).await.unwrap();
    assert_eq!(metrics.total_sent, 1);
    assert_eq!(metrics.open_count, 1);
    assert_eq!(metrics.click_count, 1);
    assert_eq!(metrics.open_rate, 100.0);
    assert_eq!(metrics.top_links.len(), 1);

    let csv = analytics.export_csv(newsletter_id).await.unwrap();
    assert!(csv.starts_with("Newsletter,\"Issue, with comma\""));
    assert!(csv.contains("Top Links,Clicks\nhttps://example.com/a,1"));

    let heat_map = analytics.heat_map(newsletter_id).await.unwrap();
    assert_eq!(heat_map.len(), 1);
    assert_eq!(heat_map[0].clicks, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_tracking_id_is_reported(pool: PgPool) {
    let analytics = Analytics::new(pool, Arc::new(EventBus::default()));
    assert_matches!(
        analytics.record_open(Uuid::new_v4()).await,
        Err(PipelineError::TrackingNotFound)
    );
    assert_matches!(
        analytics.record_click(Uuid::new_v4()).await,
        Err(PipelineError::TrackingNotFound)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn open_id_cannot_be_used_as_click(pool: PgPool) {
    send_one(&pool).await;
    let analytics = Analytics::new(pool.clone(), Arc::new(EventBus::default()));
    let open = tracking_id(&pool, "open").await;
    assert_matches!(
        analytics.record_click(open).await,
        Err(PipelineError::TrackingNotFound)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn subscriber_analytics_and_send_time(pool: PgPool) {
    let (_, subscriber_id) = send_one(&pool).await;
    let analytics = Analytics::new(pool.clone(), Arc::new(EventBus::default()));

    let report = analytics.subscriber_analytics().await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.retention_rate, 100.0);
    assert_eq!(report.growth.len(), 6);
    assert_eq!(report.growth.last().unwrap().count, 1);

    let no_data = analytics.optimal_send_time(&[subscriber_id]).await.unwrap();
    assert_eq!(no_data.sample_size, 0);
    assert_eq!(no_data.recommended_day, "Tuesday");

    analytics
        .record_open(tracking_id(&pool, "open").await)
        .await
        .unwrap();
    let with_data = analytics.optimal_send_time(&[subscriber_id]).await.unwrap();
    assert_eq!(with_data.sample_size, 1);

    let dashboard = analytics.dashboard().await.unwrap();
    assert_eq!(dashboard.subscribers.total, 1);
    assert_eq!(dashboard.newsletters.sent, 1);
    assert_eq!(dashboard.recent_newsletters.len(), 1);
}
