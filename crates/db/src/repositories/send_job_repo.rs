//! Repository for the `send_jobs` table.

use newsroom_core::status::{JOB_COMPLETED, JOB_FAILED, JOB_IN_PROGRESS};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::send_job::SendJob;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, newsletter_id, total_subscribers, sent_count, failed_count, status, \
    batch_size, delay_secs, current_batch, total_batches, started_at, \
    completed_at, error, created_at, updated_at";

/// Tracks progress of batch sends.
pub struct SendJobRepo;

impl SendJobRepo {
    /// Start a job in status `in_progress`.
    pub async fn create(
        pool: &PgPool,
        newsletter_id: DbId,
        total_subscribers: i32,
        batch_size: i32,
        delay_secs: i64,
        total_batches: i32,
    ) -> Result<SendJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO send_jobs
                (newsletter_id, total_subscribers, batch_size, delay_secs, total_batches)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SendJob>(&query)
            .bind(newsletter_id)
            .bind(total_subscribers)
            .bind(batch_size)
            .bind(delay_secs)
            .bind(total_batches)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SendJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM send_jobs WHERE id = $1");
        sqlx::query_as::<_, SendJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Jobs of one newsletter, newest first.
    pub async fn list_for_newsletter(
        pool: &PgPool,
        newsletter_id: DbId,
    ) -> Result<Vec<SendJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM send_jobs WHERE newsletter_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, SendJob>(&query)
            .bind(newsletter_id)
            .fetch_all(pool)
            .await
    }

    /// Record which batch (1-based) is being sent.
    pub async fn set_current_batch(
        pool: &PgPool,
        id: DbId,
        current_batch: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE send_jobs SET current_batch = $2 WHERE id = $1")
            .bind(id)
            .bind(current_batch)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Add one batch's successes and failures to the running totals.
    pub async fn add_results(
        pool: &PgPool,
        id: DbId,
        sent: i32,
        failed: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE send_jobs SET sent_count = sent_count + $2, failed_count = failed_count + $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn complete(pool: &PgPool, id: DbId) -> Result<SendJob, sqlx::Error> {
        let query = format!(
            "UPDATE send_jobs SET status = $2, completed_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SendJob>(&query)
            .bind(id)
            .bind(JOB_COMPLETED)
            .fetch_one(pool)
            .await
    }

    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE send_jobs SET status = $2, error = $3, completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(JOB_FAILED)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a running job as alive. Long pauses between batches call this
    /// so the job is not taken for abandoned.
    pub async fn touch(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE send_jobs SET updated_at = NOW() WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(JOB_IN_PROGRESS)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Fail every `in_progress` job not touched since `stale_before`: its
    /// process went away mid-send.
    pub async fn fail_abandoned(
        pool: &PgPool,
        stale_before: Timestamp,
        error: &str,
    ) -> Result<Vec<SendJob>, sqlx::Error> {
        let query = format!(
            "UPDATE send_jobs SET status = $3, error = $4, completed_at = NOW()
             WHERE status = $1 AND updated_at < $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SendJob>(&query)
            .bind(JOB_IN_PROGRESS)
            .bind(stale_before)
            .bind(JOB_FAILED)
            .bind(error)
            .fetch_all(pool)
            .await
    }
}
