//! Repository for the `email_deliveries` table.

use newsroom_core::status::{DELIVERY_FAILED, DELIVERY_SENT};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::delivery::{CreateDelivery, EmailDelivery};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, newsletter_id, automation_email_id, subscriber_id, send_job_id, status, \
    error, provider, bounce_processed, bounce_kind, \
    processed_at, sent_at, created_at, updated_at";

/// Delivery log: one row per send attempt.
pub struct DeliveryRepo;

impl DeliveryRepo {
    pub async fn create(pool: &PgPool, input: &CreateDelivery) -> Result<EmailDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_deliveries
                (newsletter_id, automation_email_id, subscriber_id, send_job_id,
                 status, error, bounce_kind, provider)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmailDelivery>(&query)
            .bind(input.source.newsletter_id())
            .bind(input.source.automation_email_id())
            .bind(input.subscriber_id)
            .bind(input.send_job_id)
            .bind(input.status)
            .bind(&input.error)
            .bind(input.bounce_kind.map(|k| k.as_str()))
            .bind(&input.provider)
            .fetch_one(pool)
            .await
    }

    /// Successful sends at or after `since`. Feeds the hourly/daily budget.
    pub async fn count_sent_since(pool: &PgPool, since: Timestamp) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM email_deliveries WHERE status = $1 AND sent_at >= $2",
        )
        .bind(DELIVERY_SENT)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Subscribers a newsletter was already delivered to.
    pub async fn delivered_subscriber_ids(
        pool: &PgPool,
        newsletter_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT DISTINCT subscriber_id FROM email_deliveries
             WHERE newsletter_id = $1 AND status = $2 AND subscriber_id IS NOT NULL",
        )
        .bind(newsletter_id)
        .bind(DELIVERY_SENT)
        .fetch_all(pool)
        .await
    }

    /// Bounced deliveries not processed yet, oldest first. Failures without
    /// a bounce kind are never returned.
    pub async fn list_unprocessed_failures(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<EmailDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM email_deliveries
             WHERE status = $1 AND bounce_kind IS NOT NULL AND bounce_processed = false
             ORDER BY id
             LIMIT $2"
        );
        sqlx::query_as::<_, EmailDelivery>(&query)
            .bind(DELIVERY_FAILED)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_processed(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE email_deliveries
             SET bounce_processed = true, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
