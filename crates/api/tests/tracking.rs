mod common;

use axum::http::{header, StatusCode};
use common::{body_bytes, get};
use newsroom_api::handlers::tracking::PIXEL_GIF;
use newsroom_core::status::{TRACKING_CLICK, TRACKING_OPEN};
use newsroom_db::models::newsletter::CreateNewsletter;
use newsroom_db::models::subscriber::{CreateSubscriber, Subscriber};
use newsroom_db::models::tracking::{CreateTrackingEvent, EmailSource};
use newsroom_db::repositories::{NewsletterRepo, SubscriberRepo, TrackingRepo};
use sqlx::PgPool;
use uuid::Uuid;

/// A sent newsletter and one recipient with an open and a click row.
async fn seed(pool: &PgPool) -> (i64, Subscriber, Uuid, Uuid) {
    let newsletter = NewsletterRepo::create(
        pool,
        &CreateNewsletter {
            title: "Issue".into(),
            subject: "Weekly".into(),
            content: "<p>Hi</p>".into(),
            ..Default::default()
        },
        "draft",
        None,
    )
    .await
    .unwrap();
    let subscriber = SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            email: "reader@example.com".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    let open_id = Uuid::new_v4();
    let click_id = Uuid::new_v4();
    TrackingRepo::create_many(
        pool,
        EmailSource::Newsletter(newsletter.id),
        subscriber.id,
        &[
            CreateTrackingEvent {
                tracking_id: open_id,
                kind: TRACKING_OPEN,
                original_url: None,
            },
            CreateTrackingEvent {
                tracking_id: click_id,
                kind: TRACKING_CLICK,
                original_url: Some("https://rust-lang.org/learn".into()),
            },
        ],
    )
    .await
    .unwrap();

    (newsletter.id, subscriber, open_id, click_id)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn open_pixel_records_the_open(pool: PgPool) {
    let (newsletter_id, subscriber, open_id, _) = seed(&pool).await;

    let response = get(
        common::build_test_app(pool.clone()),
        &format!("/api/track/open/{open_id}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    assert_eq!(body_bytes(response).await, PIXEL_GIF.to_vec());

    let row = TrackingRepo::find_by_tracking_id(&pool, open_id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.tracked);
    assert!(row.tracked_at.is_some());
    assert_eq!(row.hit_count, 1);

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.open_count, 1);

    let subscriber = SubscriberRepo::find_by_id(&pool, subscriber.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.open_count, 1);
    assert!(subscriber.last_opened_at.is_some());
    assert!(subscriber.engagement_score.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn open_pixel_is_served_for_unknown_ids(pool: PgPool) {
    for path in [
        format!("/api/track/open/{}", Uuid::new_v4()),
        "/api/track/open/not-a-uuid".to_string(),
    ] {
        let response = get(common::build_test_app(pool.clone()), &path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
        assert!(response.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .contains("no-store"));
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn click_redirects_to_the_original_url(pool: PgPool) {
    let (newsletter_id, subscriber, _, click_id) = seed(&pool).await;

    let response = get(
        common::build_test_app(pool.clone()),
        &format!("/api/track/click/{click_id}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://rust-lang.org/learn"
    );

    let newsletter = NewsletterRepo::find_by_id(&pool, newsletter_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.click_count, 1);
    let subscriber = SubscriberRepo::find_by_id(&pool, subscriber.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.click_count, 1);

    // Repeat clicks redirect again without double counting the unique clicker.
    let response = get(
        common::build_test_app(pool.clone()),
        &format!("/api/track/click/{click_id}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let clickers = TrackingRepo::unique_clickers(&pool, newsletter_id).await.unwrap();
    assert_eq!(clickers, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_click_is_not_found(pool: PgPool) {
    for path in [
        format!("/api/track/click/{}", Uuid::new_v4()),
        "/api/track/click/not-a-uuid".to_string(),
    ] {
        let response = get(common::build_test_app(pool.clone()), &path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
