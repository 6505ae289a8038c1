//! Repository for the `subscribers` and `removed_subscribers` tables.

use newsroom_core::status::{SUBSCRIBER_ACTIVE, SUBSCRIBER_INACTIVE, SUBSCRIBER_UNSUBSCRIBED};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::subscriber::{
    CreateSubscriber, RemovedSubscriber, Subscriber, SubscriberCounts, SubscriberListParams,
    UpdateSubscriber,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, email, name, group_name, status, tags, engagement_score, open_count, \
    click_count, soft_bounce_count, last_opened_at, last_clicked_at, \
    last_soft_bounce_at, bounce_reason, bounced_at, inactive_reason, \
    custom_fields, created_at, updated_at";

/// Default page size for subscriber listing.
const DEFAULT_LIMIT: i64 = 100;

/// Maximum page size for subscriber listing.
const MAX_LIMIT: i64 = 1000;

/// Provides CRUD, tagging and hygiene operations for subscribers.
pub struct SubscriberRepo;

impl SubscriberRepo {
    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Insert a subscriber with status `active`.
    ///
    /// Returns `None` when the email is already subscribed. The unique index
    /// on `lower(email)` makes this safe under concurrent inserts.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSubscriber,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "INSERT INTO subscribers (email, name, group_name, tags, custom_fields)
             VALUES ($1, $2, COALESCE($3, 'General'), $4, COALESCE($5, '{{}}'::jsonb))
             ON CONFLICT DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(&input.email)
            .bind(&input.name)
            .bind(&input.group_name)
            .bind(&input.tags)
            .bind(&input.custom_fields)
            .fetch_optional(pool)
            .await
    }

    /// Find a subscriber by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscribers WHERE id = $1");
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a subscriber by email (case-insensitive).
    pub async fn find_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscribers WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Load the subscribers among `ids` that still exist, in id order.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Subscriber>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscribers WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// List subscribers newest first, optionally filtered by status and tag.
    pub async fn list(
        pool: &PgPool,
        params: &SubscriberListParams,
    ) -> Result<Vec<Subscriber>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM subscribers
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR $2 = ANY(tags))
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(&params.status)
            .bind(&params.tag)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// The most recently added subscribers.
    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<Subscriber>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscribers ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Update a subscriber. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateSubscriber,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "UPDATE subscribers SET
                name = COALESCE($2, name),
                group_name = COALESCE($3, group_name),
                status = COALESCE($4, status),
                tags = COALESCE($5, tags),
                custom_fields = COALESCE($6, custom_fields)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.group_name)
            .bind(&input.status)
            .bind(&input.tags)
            .bind(&input.custom_fields)
            .fetch_optional(pool)
            .await
    }

    /// Delete a subscriber. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete many subscribers. Returns the number of rows deleted.
    pub async fn delete_many(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark the subscriber with this email as unsubscribed.
    pub async fn unsubscribe(pool: &PgPool, email: &str) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "UPDATE subscribers SET status = $2
             WHERE lower(email) = lower($1)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(email)
            .bind(SUBSCRIBER_UNSUBSCRIBED)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Append `tag` unless already present. Returns `true` if it was added.
    pub async fn add_tag(pool: &PgPool, id: DbId, tag: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscribers SET tags = array_append(tags, $2)
             WHERE id = $1 AND NOT ($2 = ANY(tags))",
        )
        .bind(id)
        .bind(tag)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove `tag`. Returns the updated row, `None` if the subscriber is gone.
    pub async fn remove_tag(
        pool: &PgPool,
        id: DbId,
        tag: &str,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "UPDATE subscribers SET tags = array_remove(tags, $2)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(id)
            .bind(tag)
            .fetch_optional(pool)
            .await
    }

    /// Add `tag` to every listed subscriber that lacks it.
    ///
    /// Returns the ids that were newly tagged.
    pub async fn add_tag_many(
        pool: &PgPool,
        ids: &[DbId],
        tag: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE subscribers SET tags = array_append(tags, $2)
             WHERE id = ANY($1) AND NOT ($2 = ANY(tags))
             RETURNING id",
        )
        .bind(ids)
        .bind(tag)
        .fetch_all(pool)
        .await
    }

    /// Ids among `ids` that exist.
    pub async fn existing_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM subscribers WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Audiences
    // -----------------------------------------------------------------------

    /// Ids of every active subscriber.
    pub async fn active_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM subscribers WHERE status = $1 ORDER BY id")
            .bind(SUBSCRIBER_ACTIVE)
            .fetch_all(pool)
            .await
    }

    /// Ids of active subscribers with at least `min_score` engagement.
    pub async fn engaged_ids(pool: &PgPool, min_score: i32) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM subscribers
             WHERE status = $1 AND engagement_score >= $2
             ORDER BY id",
        )
        .bind(SUBSCRIBER_ACTIVE)
        .bind(min_score)
        .fetch_all(pool)
        .await
    }

    /// `(id, last_opened_at)` of every active subscriber.
    pub async fn active_activity(
        pool: &PgPool,
    ) -> Result<Vec<(DbId, Option<Timestamp>)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, Option<Timestamp>)>(
            "SELECT id, last_opened_at FROM subscribers WHERE status = $1 ORDER BY id",
        )
        .bind(SUBSCRIBER_ACTIVE)
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Engagement
    // -----------------------------------------------------------------------

    /// Count an open: bump `open_count` and set `last_opened_at`.
    pub async fn record_open(pool: &PgPool, id: DbId) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "UPDATE subscribers SET open_count = open_count + 1, last_opened_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count a click: bump `click_count` and set `last_clicked_at`.
    pub async fn record_click(pool: &PgPool, id: DbId) -> Result<Option<Subscriber>, sqlx::Error> {
        let query = format!(
            "UPDATE subscribers SET click_count = click_count + 1, last_clicked_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_engagement_score(
        pool: &PgPool,
        id: DbId,
        score: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE subscribers SET engagement_score = $2 WHERE id = $1")
            .bind(id)
            .bind(score)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Every stored engagement score, `NULL` included.
    pub async fn engagement_scores(pool: &PgPool) -> Result<Vec<Option<i32>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i32>>("SELECT engagement_score FROM subscribers")
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Bounces and hygiene
    // -----------------------------------------------------------------------

    /// Set status `bounced` with a reason.
    pub async fn mark_bounced(pool: &PgPool, id: DbId, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscribers SET status = 'bounced', bounce_reason = $2, bounced_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a new soft bounce count.
    pub async fn record_soft_bounce(
        pool: &PgPool,
        id: DbId,
        soft_bounce_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscribers SET soft_bounce_count = $2, last_soft_bounce_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(soft_bounce_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Subscribers list cleaning may act on: bounced, unsubscribed, and active
    /// ones whose last open is before `inactive_before`.
    pub async fn cleanup_candidates(
        pool: &PgPool,
        inactive_before: Timestamp,
    ) -> Result<Vec<Subscriber>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscribers
             WHERE status IN ('bounced', 'unsubscribed')
                OR (status = 'active' AND last_opened_at < $1)
             ORDER BY id"
        );
        sqlx::query_as::<_, Subscriber>(&query)
            .bind(inactive_before)
            .fetch_all(pool)
            .await
    }

    /// Copy a subscriber into `removed_subscribers` and delete it, in one
    /// statement. Returns `None` if the subscriber no longer exists.
    pub async fn archive_and_delete(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<Option<RemovedSubscriber>, sqlx::Error> {
        sqlx::query_as::<_, RemovedSubscriber>(
            "WITH removed AS (
                 DELETE FROM subscribers WHERE id = $1 RETURNING *
             )
             INSERT INTO removed_subscribers (original_id, email, reason, snapshot)
             SELECT id, email, $2, to_jsonb(removed) FROM removed
             RETURNING id, original_id, email, reason, snapshot, removed_at",
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(pool)
        .await
    }

    /// Move an active subscriber to `inactive`. Returns `true` if updated.
    pub async fn mark_inactive(pool: &PgPool, id: DbId, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscribers SET status = $3, inactive_reason = $2
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(reason)
        .bind(SUBSCRIBER_INACTIVE)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    /// Subscriber totals by status.
    pub async fn counts(pool: &PgPool) -> Result<SubscriberCounts, sqlx::Error> {
        sqlx::query_as::<_, SubscriberCounts>(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'unsubscribed') AS unsubscribed,
                COUNT(*) FILTER (WHERE status = 'bounced') AS bounced,
                COUNT(*) FILTER (WHERE status = 'inactive') AS inactive
             FROM subscribers",
        )
        .fetch_one(pool)
        .await
    }

    /// New subscribers per `YYYY-MM` month (UTC) created at or after `since`.
    pub async fn monthly_signups(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM') AS month, COUNT(*)
             FROM subscribers
             WHERE created_at >= $1
             GROUP BY 1
             ORDER BY 1",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }
}
