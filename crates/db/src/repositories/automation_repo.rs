//! Repository for the `automations` and `automation_emails` tables.

use newsroom_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::automation::{
    Automation, AutomationEmail, AutomationWithEmails, CreateAutomation, CreateAutomationEmail,
    UpdateAutomation,
};

/// Column list for `automations` queries.
const COLUMNS: &str = "\
    id, name, automation_type, trigger_type, active, initial_delay_secs, \
    inactive_days, conditions, emails_sent, created_at, updated_at";

/// Column list for `automation_emails` queries.
const EMAIL_COLUMNS: &str = "\
    id, automation_id, position, subject, content, delay_secs, created_at, updated_at";

/// Provides CRUD for automations and their ordered emails.
pub struct AutomationRepo;

impl AutomationRepo {
    /// Insert an automation and its emails in one transaction.
    ///
    /// `trigger_type` overrides the DTO's value; callers resolve defaults.
    pub async fn create(
        pool: &PgPool,
        input: &CreateAutomation,
        trigger_type: Option<&str>,
    ) -> Result<AutomationWithEmails, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO automations
                (name, automation_type, trigger_type, active, initial_delay_secs,
                 inactive_days, conditions)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, '[]'::jsonb))
             RETURNING {COLUMNS}"
        );
        let automation = sqlx::query_as::<_, Automation>(&query)
            .bind(input.name.trim())
            .bind(&input.automation_type)
            .bind(trigger_type)
            .bind(input.active)
            .bind(input.initial_delay_secs.max(0))
            .bind(input.inactive_days)
            .bind(&input.conditions)
            .fetch_one(&mut *tx)
            .await?;

        let emails = insert_emails(&mut tx, automation.id, &input.emails).await?;

        tx.commit().await?;
        Ok(AutomationWithEmails { automation, emails })
    }

    /// Find an automation by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Automation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automations WHERE id = $1");
        sqlx::query_as::<_, Automation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an automation together with its ordered emails.
    pub async fn find_with_emails(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<AutomationWithEmails>, sqlx::Error> {
        let Some(automation) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let emails = Self::list_emails(pool, id).await?;
        Ok(Some(AutomationWithEmails { automation, emails }))
    }

    /// List all automations, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Automation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automations ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, Automation>(&query).fetch_all(pool).await
    }

    /// Active automations that can start from an event: trigger automations
    /// and welcome sequences.
    pub async fn list_event_driven(pool: &PgPool) -> Result<Vec<Automation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automations
             WHERE active AND automation_type IN ('trigger', 'welcome')
             ORDER BY id"
        );
        sqlx::query_as::<_, Automation>(&query).fetch_all(pool).await
    }

    /// Emails of an automation in sequence order.
    pub async fn list_emails(
        pool: &PgPool,
        automation_id: DbId,
    ) -> Result<Vec<AutomationEmail>, sqlx::Error> {
        let query = format!(
            "SELECT {EMAIL_COLUMNS} FROM automation_emails
             WHERE automation_id = $1
             ORDER BY position"
        );
        sqlx::query_as::<_, AutomationEmail>(&query)
            .bind(automation_id)
            .fetch_all(pool)
            .await
    }

    /// Update an automation. Only non-`None` fields in `input` are applied.
    ///
    /// A given email list replaces the sequence, and every enrollment's index
    /// is clamped to the new length so it never points past the last email.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateAutomation,
    ) -> Result<Option<AutomationWithEmails>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE automations SET
                name = COALESCE($2, name),
                active = COALESCE($3, active),
                trigger_type = COALESCE($4, trigger_type),
                initial_delay_secs = COALESCE($5, initial_delay_secs),
                inactive_days = COALESCE($6, inactive_days),
                conditions = COALESCE($7, conditions)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let Some(automation) = sqlx::query_as::<_, Automation>(&query)
            .bind(id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(input.active)
            .bind(&input.trigger_type)
            .bind(input.initial_delay_secs.map(|d| d.max(0)))
            .bind(input.inactive_days)
            .bind(&input.conditions)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let emails = match &input.emails {
            Some(new_emails) => {
                sqlx::query("DELETE FROM automation_emails WHERE automation_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                let emails = insert_emails(&mut tx, id, new_emails).await?;
                sqlx::query(
                    "UPDATE subscriber_automations
                     SET current_email_index = LEAST(current_email_index, $2)
                     WHERE automation_id = $1",
                )
                .bind(id)
                .bind(emails.len() as i32)
                .execute(&mut *tx)
                .await?;
                emails
            }
            None => {
                let query = format!(
                    "SELECT {EMAIL_COLUMNS} FROM automation_emails
                     WHERE automation_id = $1
                     ORDER BY position"
                );
                sqlx::query_as::<_, AutomationEmail>(&query)
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;
        Ok(Some(AutomationWithEmails { automation, emails }))
    }

    /// Delete an automation. Emails cascade; enrollments are detached and
    /// ended by the advancer.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM automations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_emails_sent(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE automations SET emails_sent = emails_sent + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

async fn insert_emails(
    conn: &mut PgConnection,
    automation_id: DbId,
    emails: &[CreateAutomationEmail],
) -> Result<Vec<AutomationEmail>, sqlx::Error> {
    let query = format!(
        "INSERT INTO automation_emails (automation_id, position, subject, content, delay_secs)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {EMAIL_COLUMNS}"
    );
    let mut rows = Vec::with_capacity(emails.len());
    for (position, email) in emails.iter().enumerate() {
        let row = sqlx::query_as::<_, AutomationEmail>(&query)
            .bind(automation_id)
            .bind(position as i32)
            .bind(&email.subject)
            .bind(&email.content)
            .bind(email.delay_secs.max(0))
            .fetch_one(&mut *conn)
            .await?;
        rows.push(row);
    }
    Ok(rows)
}
