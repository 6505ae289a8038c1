//! Repository for the `subscriber_automations` and `automation_logs` tables.

use newsroom_core::status::{ENROLLMENT_ACTIVE, ENROLLMENT_COMPLETED, END_SEQUENCE_COMPLETED};
use newsroom_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::automation::{
    AutomationLog, CreateAutomationLog, CreateEnrollment, SubscriberAutomation,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, automation_id, subscriber_id, current_email_index, status, started_at, \
    next_email_at, last_email_sent_at, last_email_id, ended_at, end_reason, \
    custom_data, locked_until, created_at, updated_at";

/// Enrollment state of subscribers in automations.
pub struct EnrollmentRepo;

impl EnrollmentRepo {
    /// Enroll a subscriber. Returns `None` when the pair already exists.
    pub async fn enroll(
        pool: &PgPool,
        input: &CreateEnrollment,
    ) -> Result<Option<SubscriberAutomation>, sqlx::Error> {
        let query = format!(
            "INSERT INTO subscriber_automations
                (automation_id, subscriber_id, next_email_at, custom_data, status)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT ON CONSTRAINT uq_subscriber_automations_pair DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SubscriberAutomation>(&query)
            .bind(input.automation_id)
            .bind(input.subscriber_id)
            .bind(input.next_email_at)
            .bind(&input.custom_data)
            .bind(ENROLLMENT_ACTIVE)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<SubscriberAutomation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriber_automations WHERE id = $1");
        sqlx::query_as::<_, SubscriberAutomation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Enrollments of an automation, oldest first.
    pub async fn list_for_automation(
        pool: &PgPool,
        automation_id: DbId,
    ) -> Result<Vec<SubscriberAutomation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriber_automations
             WHERE automation_id = $1
             ORDER BY id"
        );
        sqlx::query_as::<_, SubscriberAutomation>(&query)
            .bind(automation_id)
            .fetch_all(pool)
            .await
    }

    /// Lease up to `limit` due enrollments until `lease_until`.
    ///
    /// Rows locked by a concurrent claim are skipped, and a leased row is
    /// not returned again until its lease expires or is released. The
    /// returned `locked_until` is the lease every later write must present.
    pub async fn claim_due(
        pool: &PgPool,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> Result<Vec<SubscriberAutomation>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriber_automations SET locked_until = $2
             WHERE id IN (
                 SELECT id FROM subscriber_automations
                 WHERE status = $3
                   AND next_email_at <= $1
                   AND (locked_until IS NULL OR locked_until < $1)
                 ORDER BY next_email_at
                 LIMIT $4
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SubscriberAutomation>(&query)
            .bind(now)
            .bind(lease_until)
            .bind(ENROLLMENT_ACTIVE)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Move a lease the caller still holds to `lease_until`.
    ///
    /// `held` is the `locked_until` the caller was handed. Returns the new
    /// lease, or `None` when the lease expired and another pass took the
    /// row (or already moved it on).
    pub async fn renew_lease(
        pool: &PgPool,
        id: DbId,
        held: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar::<_, Timestamp>(
            "UPDATE subscriber_automations SET locked_until = $3
             WHERE id = $1 AND locked_until = $2 AND status = $4
             RETURNING locked_until",
        )
        .bind(id)
        .bind(held)
        .bind(lease_until)
        .bind(ENROLLMENT_ACTIVE)
        .fetch_optional(pool)
        .await
    }

    /// End a leased enrollment without sending. Returns `false` when the
    /// lease was lost.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        held: Timestamp,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriber_automations SET
                status = $3,
                end_reason = $4,
                ended_at = NOW(),
                next_email_at = NULL,
                locked_until = NULL
             WHERE id = $1 AND locked_until = $2",
        )
        .bind(id)
        .bind(held)
        .bind(ENROLLMENT_COMPLETED)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a sent email and schedule the next one. Returns `false` when
    /// the lease was lost.
    pub async fn advance(
        pool: &PgPool,
        id: DbId,
        held: Timestamp,
        next_index: i32,
        next_email_at: Timestamp,
        sent_email_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriber_automations SET
                current_email_index = $3,
                next_email_at = $4,
                last_email_id = $5,
                last_email_sent_at = NOW(),
                locked_until = NULL
             WHERE id = $1 AND locked_until = $2",
        )
        .bind(id)
        .bind(held)
        .bind(next_index)
        .bind(next_email_at)
        .bind(sent_email_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record the last email of the sequence and complete the enrollment.
    /// Returns `false` when the lease was lost.
    pub async fn finish_sequence(
        pool: &PgPool,
        id: DbId,
        held: Timestamp,
        next_index: i32,
        sent_email_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriber_automations SET
                current_email_index = $3,
                last_email_id = $4,
                last_email_sent_at = NOW(),
                status = $5,
                end_reason = $6,
                ended_at = NOW(),
                next_email_at = NULL,
                locked_until = NULL
             WHERE id = $1 AND locked_until = $2",
        )
        .bind(id)
        .bind(held)
        .bind(next_index)
        .bind(sent_email_id)
        .bind(ENROLLMENT_COMPLETED)
        .bind(END_SEQUENCE_COMPLETED)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop a held lease so the enrollment is retried on the next pass.
    pub async fn release(pool: &PgPool, id: DbId, held: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriber_automations SET locked_until = NULL
             WHERE id = $1 AND locked_until = $2",
        )
        .bind(id)
        .bind(held)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    pub async fn log(
        pool: &PgPool,
        input: &CreateAutomationLog,
    ) -> Result<AutomationLog, sqlx::Error> {
        sqlx::query_as::<_, AutomationLog>(
            "INSERT INTO automation_logs
                (automation_id, subscriber_id, automation_email_id, success, error)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, automation_id, subscriber_id, automation_email_id, success, error, sent_at",
        )
        .bind(input.automation_id)
        .bind(input.subscriber_id)
        .bind(input.automation_email_id)
        .bind(input.success)
        .bind(&input.error)
        .fetch_one(pool)
        .await
    }

    /// Log entries of an automation, newest first.
    pub async fn list_logs(
        pool: &PgPool,
        automation_id: DbId,
        limit: i64,
    ) -> Result<Vec<AutomationLog>, sqlx::Error> {
        sqlx::query_as::<_, AutomationLog>(
            "SELECT id, automation_id, subscriber_id, automation_email_id, success, error, sent_at
             FROM automation_logs
             WHERE automation_id = $1
             ORDER BY sent_at DESC, id DESC
             LIMIT $2",
        )
        .bind(automation_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
