//! Repository for the `newsletters` table.

use newsroom_core::newsletter::CLAIMABLE_STATUSES;
use newsroom_core::status::{
    NEWSLETTER_DRAFT, NEWSLETTER_SCHEDULED, NEWSLETTER_SENDING, NEWSLETTER_SENT,
};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::newsletter::{
    ArchivedNewsletter, CreateNewsletter, Newsletter, NewsletterCounts, NewsletterListParams,
    NewsletterSummary, UpdateNewsletter,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, title, subject, content, use_template, template, template_data, \
    target_audience, status, scheduled_at, sent_at, sent_count, open_count, \
    click_count, created_by, created_at, updated_at";

/// Default page size for newsletter listing.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for newsletter listing.
const MAX_LIMIT: i64 = 500;

/// Provides CRUD and send-state operations for newsletters.
pub struct NewsletterRepo;

impl NewsletterRepo {
    /// Insert a newsletter. `status` is decided by the caller.
    pub async fn create(
        pool: &PgPool,
        input: &CreateNewsletter,
        status: &str,
        created_by: Option<DbId>,
    ) -> Result<Newsletter, sqlx::Error> {
        let target_audience = input
            .target_audience
            .clone()
            .unwrap_or_default()
            .to_json();
        let query = format!(
            "INSERT INTO newsletters
                (title, subject, content, use_template, template, template_data,
                 target_audience, status, scheduled_at, created_by)
             VALUES ($1, $2, $3, $4, COALESCE($5, 'modern'), COALESCE($6, '{{}}'::jsonb),
                     $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(&input.title)
            .bind(&input.subject)
            .bind(&input.content)
            .bind(input.use_template)
            .bind(&input.template)
            .bind(&input.template_data)
            .bind(&target_audience)
            .bind(status)
            .bind(input.scheduled_at)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Find a newsletter by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Newsletter>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM newsletters WHERE id = $1");
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List newsletters newest first.
    pub async fn list(
        pool: &PgPool,
        params: &NewsletterListParams,
    ) -> Result<Vec<Newsletter>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM newsletters ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Sent newsletters for the public archive, most recent first.
    pub async fn list_archive(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ArchivedNewsletter>, sqlx::Error> {
        sqlx::query_as::<_, ArchivedNewsletter>(
            "SELECT id, title, subject, sent_at FROM newsletters
             WHERE status = $1
             ORDER BY sent_at DESC NULLS LAST, id DESC
             LIMIT $2",
        )
        .bind(NEWSLETTER_SENT)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// The most recently created newsletters.
    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<NewsletterSummary>, sqlx::Error> {
        sqlx::query_as::<_, NewsletterSummary>(
            "SELECT id, title, status, sent_count, open_count, click_count, created_at
             FROM newsletters
             ORDER BY created_at DESC, id DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Update a newsletter. Only non-`None` fields in `input` are applied.
    ///
    /// A changed `scheduled_at` moves a draft to `scheduled`. Newsletters that
    /// are sending or sent keep their status.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateNewsletter,
    ) -> Result<Option<Newsletter>, sqlx::Error> {
        let target_audience = input.target_audience.as_ref().map(|t| t.to_json());
        let query = format!(
            "UPDATE newsletters SET
                title = COALESCE($2, title),
                subject = COALESCE($3, subject),
                content = COALESCE($4, content),
                use_template = COALESCE($5, use_template),
                template = COALESCE($6, template),
                template_data = COALESCE($7, template_data),
                target_audience = COALESCE($8, target_audience),
                scheduled_at = COALESCE($9, scheduled_at),
                status = CASE
                    WHEN $9::timestamptz IS NOT NULL AND status = $10 THEN $11
                    ELSE status
                END
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(id)
            .bind(&input.title)
            .bind(&input.subject)
            .bind(&input.content)
            .bind(input.use_template)
            .bind(&input.template)
            .bind(&input.template_data)
            .bind(&target_audience)
            .bind(input.scheduled_at)
            .bind(NEWSLETTER_DRAFT)
            .bind(NEWSLETTER_SCHEDULED)
            .fetch_optional(pool)
            .await
    }

    /// Delete a newsletter. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM newsletters WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Send state
    // -----------------------------------------------------------------------

    /// Move a draft or scheduled newsletter to `sending`.
    ///
    /// Returns `None` if the newsletter does not exist or was already
    /// claimed, so a newsletter can only be sent once.
    pub async fn claim_for_sending(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Newsletter>, sqlx::Error> {
        let query = format!(
            "UPDATE newsletters SET status = $2
             WHERE id = $1 AND status = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(id)
            .bind(NEWSLETTER_SENDING)
            .bind(CLAIMABLE_STATUSES)
            .fetch_optional(pool)
            .await
    }

    /// Claim every scheduled newsletter that is due, in schedule order.
    pub async fn claim_due_scheduled(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<Newsletter>, sqlx::Error> {
        let query = format!(
            "UPDATE newsletters SET status = $1
             WHERE id IN (
                 SELECT id FROM newsletters
                 WHERE status = $2 AND scheduled_at <= $3
                 ORDER BY scheduled_at
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Newsletter>(&query)
            .bind(NEWSLETTER_SENDING)
            .bind(NEWSLETTER_SCHEDULED)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Return a claimed newsletter to `status` after a send that could not
    /// start.
    pub async fn release_claim(pool: &PgPool, id: DbId, status: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE newsletters SET status = $2 WHERE id = $1 AND status = $3")
            .bind(id)
            .bind(status)
            .bind(NEWSLETTER_SENDING)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize a send: status `sent`, `sent_at` now, `sent_count` at least
    /// the given value (a resumed send only counts its own recipients).
    pub async fn mark_sent(pool: &PgPool, id: DbId, sent_count: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE newsletters
             SET status = $2, sent_at = NOW(), sent_count = GREATEST(sent_count, $3)
             WHERE id = $1",
        )
        .bind(id)
        .bind(NEWSLETTER_SENT)
        .bind(sent_count)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn increment_sent(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE newsletters SET sent_count = sent_count + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn increment_open(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE newsletters SET open_count = open_count + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn increment_click(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE newsletters SET click_count = click_count + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Newsletter totals by status plus the total number of emails sent.
    pub async fn counts(pool: &PgPool) -> Result<NewsletterCounts, sqlx::Error> {
        sqlx::query_as::<_, NewsletterCounts>(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'draft') AS draft,
                COUNT(*) FILTER (WHERE status = 'scheduled') AS scheduled,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COALESCE(SUM(sent_count), 0)::BIGINT AS emails_sent
             FROM newsletters",
        )
        .fetch_one(pool)
        .await
    }
}
