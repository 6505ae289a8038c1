//! Repository for the `tracking_events` table.

use newsroom_core::status::{TRACKING_CLICK, TRACKING_OPEN};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::tracking::{CreateTrackingEvent, EmailSource, TrackingEvent, UrlClicks};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, tracking_id, kind, newsletter_id, automation_email_id, subscriber_id, \
    original_url, tracked, tracked_at, hit_count, created_at, updated_at";

/// Open and click tracking rows.
pub struct TrackingRepo;

impl TrackingRepo {
    /// Store the tracking rows of one outgoing email, untracked.
    pub async fn create_many(
        pool: &PgPool,
        source: EmailSource,
        subscriber_id: DbId,
        events: &[CreateTrackingEvent],
    ) -> Result<u64, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = events.iter().map(|e| e.tracking_id).collect();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind).collect();
        let urls: Vec<Option<String>> = events.iter().map(|e| e.original_url.clone()).collect();

        let result = sqlx::query(
            "INSERT INTO tracking_events
                (tracking_id, kind, original_url, newsletter_id, automation_email_id, subscriber_id)
             SELECT t.tracking_id, t.kind, t.original_url, $4, $5, $6
             FROM UNNEST($1::uuid[], $2::text[], $3::text[]) AS t(tracking_id, kind, original_url)",
        )
        .bind(&ids)
        .bind(&kinds)
        .bind(&urls)
        .bind(source.newsletter_id())
        .bind(source.automation_email_id())
        .bind(subscriber_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_tracking_id(
        pool: &PgPool,
        tracking_id: Uuid,
    ) -> Result<Option<TrackingEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tracking_events WHERE tracking_id = $1");
        sqlx::query_as::<_, TrackingEvent>(&query)
            .bind(tracking_id)
            .fetch_optional(pool)
            .await
    }

    /// Register a hit on a tracking row of the given kind.
    ///
    /// The first hit sets `tracked` and `tracked_at`; every hit increments
    /// `hit_count`. Returns `None` for an unknown id or a kind mismatch.
    pub async fn record_hit(
        pool: &PgPool,
        tracking_id: Uuid,
        kind: &str,
    ) -> Result<Option<TrackingEvent>, sqlx::Error> {
        let query = format!(
            "UPDATE tracking_events SET
                tracked = true,
                tracked_at = COALESCE(tracked_at, NOW()),
                hit_count = hit_count + 1
             WHERE tracking_id = $1 AND kind = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TrackingEvent>(&query)
            .bind(tracking_id)
            .bind(kind)
            .fetch_optional(pool)
            .await
    }

    /// Distinct subscribers who opened a newsletter.
    pub async fn unique_openers(pool: &PgPool, newsletter_id: DbId) -> Result<i64, sqlx::Error> {
        Self::unique_subscribers(pool, newsletter_id, TRACKING_OPEN).await
    }

    /// Distinct subscribers who clicked any link of a newsletter.
    pub async fn unique_clickers(pool: &PgPool, newsletter_id: DbId) -> Result<i64, sqlx::Error> {
        Self::unique_subscribers(pool, newsletter_id, TRACKING_CLICK).await
    }

    async fn unique_subscribers(
        pool: &PgPool,
        newsletter_id: DbId,
        kind: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT subscriber_id) FROM tracking_events
             WHERE newsletter_id = $1 AND kind = $2 AND tracked",
        )
        .bind(newsletter_id)
        .bind(kind)
        .fetch_one(pool)
        .await
    }

    /// Tracked clicks per original URL of a newsletter, most clicked first.
    pub async fn clicks_per_url(
        pool: &PgPool,
        newsletter_id: DbId,
    ) -> Result<Vec<UrlClicks>, sqlx::Error> {
        sqlx::query_as::<_, UrlClicks>(
            "SELECT original_url AS url, COUNT(*) AS clicks FROM tracking_events
             WHERE newsletter_id = $1 AND kind = $2 AND tracked AND original_url IS NOT NULL
             GROUP BY original_url
             ORDER BY clicks DESC, url",
        )
        .bind(newsletter_id)
        .bind(TRACKING_CLICK)
        .fetch_all(pool)
        .await
    }

    /// Distinct emails among a subscriber's `window` most recent open rows.
    pub async fn recent_distinct_emails(
        pool: &PgPool,
        subscriber_id: DbId,
        window: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT COALESCE('n' || newsletter_id::text, 'a' || automation_email_id::text))
             FROM (
                 SELECT newsletter_id, automation_email_id FROM tracking_events
                 WHERE subscriber_id = $1 AND kind = $2
                 ORDER BY created_at DESC, id DESC
                 LIMIT $3
             ) recent",
        )
        .bind(subscriber_id)
        .bind(TRACKING_OPEN)
        .bind(window)
        .fetch_one(pool)
        .await
    }

    /// Up to `per_subscriber` most recent tracked open times of each listed
    /// subscriber.
    pub async fn recent_open_times(
        pool: &PgPool,
        subscriber_ids: &[DbId],
        per_subscriber: i64,
    ) -> Result<Vec<Timestamp>, sqlx::Error> {
        sqlx::query_scalar::<_, Timestamp>(
            "SELECT tracked_at FROM (
                 SELECT tracked_at,
                        ROW_NUMBER() OVER (PARTITION BY subscriber_id ORDER BY tracked_at DESC) AS rn
                 FROM tracking_events
                 WHERE subscriber_id = ANY($1) AND kind = $2 AND tracked AND tracked_at IS NOT NULL
             ) ranked
             WHERE rn <= $3",
        )
        .bind(subscriber_ids)
        .bind(TRACKING_OPEN)
        .bind(per_subscriber)
        .fetch_all(pool)
        .await
    }
}
