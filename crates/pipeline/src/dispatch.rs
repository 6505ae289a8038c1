//! Sending of scheduled newsletters once they are due.

use chrono::Utc;
use newsroom_core::status::NEWSLETTER_DRAFT;
use newsroom_db::repositories::NewsletterRepo;
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::sender::{BatchOptions, PreparedBatch, Sender};

#[derive(Clone)]
pub struct ScheduledDispatch {
    pool: PgPool,
    sender: Sender,
}

impl ScheduledDispatch {
    pub fn new(pool: PgPool, sender: Sender) -> Self {
        Self { pool, sender }
    }

    /// Claim every due scheduled newsletter and prepare its send.
    ///
    /// A newsletter whose send cannot be prepared goes back to `draft`, so
    /// it is not retried every tick.
    pub async fn claim_due(&self) -> Result<Vec<PreparedBatch>, PipelineError> {
        let due = NewsletterRepo::claim_due_scheduled(&self.pool, Utc::now()).await?;
        let mut prepared = Vec::with_capacity(due.len());

        for newsletter in due {
            match self
                .sender
                .prepare_for_audience(&newsletter, BatchOptions::default())
                .await
            {
                Ok(batch) => prepared.push(batch),
                Err(e) => {
                    tracing::error!(
                        newsletter_id = newsletter.id,
                        error = %e,
                        "Scheduled newsletter could not be sent, moved back to draft",
                    );
                    NewsletterRepo::release_claim(&self.pool, newsletter.id, NEWSLETTER_DRAFT)
                        .await?;
                }
            }
        }
        Ok(prepared)
    }

    /// Start every due scheduled send in the background. Returns how many
    /// sends were started.
    ///
    /// Abandoned sends are recovered first, so a scheduled newsletter whose
    /// sending process died is resumed in the same pass.
    pub async fn dispatch_due(&self) -> Result<usize, PipelineError> {
        let recovered = self.sender.recover_abandoned_sends().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "Abandoned sends recovered");
        }

        let prepared = self.claim_due().await?;
        let started = prepared.len();

        for batch in prepared {
            self.sender.spawn_batch(batch);
        }

        if started > 0 {
            tracing::info!(started, "Scheduled newsletters dispatched");
        }
        Ok(started)
    }
}
