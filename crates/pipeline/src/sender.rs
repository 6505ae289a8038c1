//! Single and batch email sending.
//!
//! Every email goes through [`Sender::send_single_email`]: the body is
//! rewritten for open/click tracking, the tracking rows are stored, the mail
//! is handed to the [`Mailer`] and the attempt is written to the delivery
//! log. Batch sends split the recipients into fixed-size batches, send each
//! batch concurrently and pause between batches.
//!
//! Background batch sends are tracked by the [`Sender`]. On shutdown they
//! stop at the next batch boundary, fail their job and hand the newsletter
//! back so the remaining recipients can be sent later. A job whose process
//! died without that goes stale and is swept by
//! [`Sender::recover_abandoned_sends`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use futures::future::join_all;
use newsroom_core::batching::plan_batches;
use newsroom_core::newsletter::{initial_status, TargetAudience, SEGMENT_MIN_ENGAGEMENT};
use newsroom_core::status::{DELIVERY_FAILED, DELIVERY_SENT, TRACKING_CLICK, TRACKING_OPEN};
use newsroom_core::tracking::process_content_for_tracking;
use newsroom_core::types::DbId;
use newsroom_db::models::automation::AutomationEmail;
use newsroom_db::models::delivery::CreateDelivery;
use newsroom_db::models::newsletter::Newsletter;
use newsroom_db::models::send_job::SendJob;
use newsroom_db::models::subscriber::Subscriber;
use newsroom_db::models::tracking::{CreateTrackingEvent, EmailSource};
use newsroom_db::repositories::{
    DeliveryRepo, NewsletterRepo, SendJobRepo, SubscriberRepo, TrackingRepo,
};
use newsroom_events::{MailError, Mailer, OutgoingEmail};
use sqlx::PgPool;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::DeliveryConfig;
use crate::error::PipelineError;

/// Shortest pause while waiting for the hourly/daily budget to free up.
const MIN_BUDGET_WAIT: Duration = Duration::from_secs(1);

/// How often a pausing batch send marks its job as alive.
const JOB_HEARTBEAT: Duration = Duration::from_secs(60);

/// An `in_progress` job untouched for this long has lost its process.
const ABANDONED_AFTER_SECS: i64 = 600;

const ABANDONED_ERROR: &str = "Send abandoned: the sending process stopped";

// ---------------------------------------------------------------------------
// Messages and outcomes
// ---------------------------------------------------------------------------

/// A rendered email body, not yet personalised with tracking.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub source: EmailSource,
    pub subject: String,
    pub title: String,
    pub html: String,
}

impl EmailMessage {
    /// Render a newsletter, template or free-form.
    pub fn for_newsletter(newsletter: &Newsletter) -> Result<Self, PipelineError> {
        let html = newsletter.content_view().render(Utc::now().year())?;
        Ok(Self {
            source: EmailSource::Newsletter(newsletter.id),
            subject: newsletter.subject.clone(),
            title: newsletter.title.clone(),
            html,
        })
    }

    pub fn for_automation_email(email: &AutomationEmail) -> Self {
        Self {
            source: EmailSource::AutomationEmail(email.id),
            subject: email.subject.clone(),
            title: email.subject.clone(),
            html: email.content.clone(),
        }
    }
}

/// Result of sending one email to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed { error: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Overrides for one batch send. `None` uses the configured value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub batch_size: Option<usize>,
    pub delay: Option<Duration>,
}

/// A send job whose recipients and body are resolved and ready to go.
#[derive(Debug)]
pub struct PreparedBatch {
    pub job: SendJob,
    message: EmailMessage,
    subscribers: Vec<Subscriber>,
    batch_size: usize,
    delay: Duration,
    /// Status the newsletter returns to if the send is interrupted.
    release_to: &'static str,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Sender {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    config: DeliveryConfig,
    /// Batch sends running in the background.
    tasks: TaskTracker,
    /// Stops background batch sends at their next batch boundary.
    cancel: CancellationToken,
}

impl Sender {
    pub fn new(pool: PgPool, mailer: Arc<dyn Mailer>, config: DeliveryConfig) -> Self {
        Self {
            pool,
            mailer,
            config,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    /// Send one email to one subscriber. Never fails: the outcome says
    /// whether the mail went out, and the attempt is logged either way.
    pub async fn send_single_email(
        &self,
        message: &EmailMessage,
        subscriber: &Subscriber,
        send_job_id: Option<DbId>,
    ) -> SendOutcome {
        let tracked = process_content_for_tracking(&message.html, &self.config.app_url);

        let mut events = Vec::with_capacity(tracked.links.len() + 1);
        events.push(CreateTrackingEvent {
            tracking_id: tracked.pixel_id,
            kind: TRACKING_OPEN,
            original_url: None,
        });
        events.extend(tracked.links.iter().map(|link| CreateTrackingEvent {
            tracking_id: link.tracking_id,
            kind: TRACKING_CLICK,
            original_url: Some(link.original_url.clone()),
        }));

        if let Err(e) =
            TrackingRepo::create_many(&self.pool, message.source, subscriber.id, &events).await
        {
            tracing::error!(subscriber_id = subscriber.id, error = %e, "Failed to store tracking rows");
            return SendOutcome::Failed {
                error: format!("Failed to store tracking rows: {e}"),
            };
        }

        let email = OutgoingEmail::new(
            &subscriber.email,
            subscriber.name.as_deref(),
            &message.subject,
            tracked.html,
        )
        .with_title(&message.title)
        .with_template(self.config.newsletter_template_id.clone());

        match self.mailer.send(&email).await {
            Ok(()) => {
                if let Some(newsletter_id) = message.source.newsletter_id() {
                    if let Err(e) = NewsletterRepo::increment_sent(&self.pool, newsletter_id).await
                    {
                        tracing::warn!(newsletter_id, error = %e, "Failed to count sent email");
                    }
                }
                self.log_delivery(message.source, subscriber.id, send_job_id, None)
                    .await;
                SendOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(
                    subscriber_id = subscriber.id,
                    bounce = ?e.bounce_kind(),
                    error = %e,
                    "Email send failed",
                );
                self.log_delivery(message.source, subscriber.id, send_job_id, Some(&e))
                    .await;
                SendOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn log_delivery(
        &self,
        source: EmailSource,
        subscriber_id: DbId,
        send_job_id: Option<DbId>,
        failure: Option<&MailError>,
    ) {
        let input = CreateDelivery {
            source,
            subscriber_id,
            send_job_id,
            status: if failure.is_some() {
                DELIVERY_FAILED
            } else {
                DELIVERY_SENT
            },
            error: failure.map(ToString::to_string),
            bounce_kind: failure.and_then(MailError::bounce_kind),
            provider: self.mailer.provider().to_string(),
        };
        if let Err(e) = DeliveryRepo::create(&self.pool, &input).await {
            tracing::error!(subscriber_id, error = %e, "Failed to record delivery");
        }
    }

    /// Send a newsletter to the given subscribers and wait for completion.
    ///
    /// The newsletter's status is not checked here; callers that must not
    /// send twice claim it first (see [`Sender::start_newsletter_send`]).
    pub async fn send_batch_emails(
        &self,
        newsletter_id: DbId,
        subscriber_ids: &[DbId],
        options: BatchOptions,
    ) -> Result<SendJob, PipelineError> {
        let newsletter = NewsletterRepo::find_by_id(&self.pool, newsletter_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Newsletter", newsletter_id))?;
        let batch = self.prepare_batch(&newsletter, subscriber_ids, options).await?;
        self.run_batch(batch).await
    }

    /// Claim a draft or scheduled newsletter and prepare its send to the
    /// newsletter's target audience.
    ///
    /// A newsletter that is already sending or sent yields a conflict. When
    /// preparation fails the claim is released.
    pub async fn start_newsletter_send(
        &self,
        newsletter_id: DbId,
        options: BatchOptions,
    ) -> Result<PreparedBatch, PipelineError> {
        let Some(newsletter) = NewsletterRepo::claim_for_sending(&self.pool, newsletter_id).await?
        else {
            return match NewsletterRepo::find_by_id(&self.pool, newsletter_id).await? {
                None => Err(PipelineError::not_found("Newsletter", newsletter_id)),
                Some(_) => Err(PipelineError::conflict(
                    "Newsletter has already been sent or is being sent",
                )),
            };
        };

        match self.prepare_for_audience(&newsletter, options).await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                let previous = initial_status(newsletter.scheduled_at);
                NewsletterRepo::release_claim(&self.pool, newsletter.id, previous).await?;
                Err(e)
            }
        }
    }

    /// Prepare a send of an already claimed newsletter to its target audience.
    ///
    /// Subscribers that already received the newsletter are left out.
    pub async fn prepare_for_audience(
        &self,
        newsletter: &Newsletter,
        options: BatchOptions,
    ) -> Result<PreparedBatch, PipelineError> {
        let audience = TargetAudience::from_json(&newsletter.target_audience)?;
        let mut subscriber_ids = self.resolve_audience(&audience).await?;

        // An interrupted send resumes with whoever has not received it yet.
        let delivered: HashSet<DbId> =
            DeliveryRepo::delivered_subscriber_ids(&self.pool, newsletter.id)
                .await?
                .into_iter()
                .collect();
        if !delivered.is_empty() {
            subscriber_ids.retain(|id| !delivered.contains(id));
            tracing::info!(
                newsletter_id = newsletter.id,
                already_delivered = delivered.len(),
                "Resuming newsletter send",
            );
        }

        self.prepare_batch(newsletter, &subscriber_ids, options).await
    }

    /// Subscriber ids a target audience expands to.
    pub async fn resolve_audience(
        &self,
        audience: &TargetAudience,
    ) -> Result<Vec<DbId>, PipelineError> {
        let ids = match audience {
            TargetAudience::All => SubscriberRepo::active_ids(&self.pool).await?,
            TargetAudience::Segment => {
                SubscriberRepo::engaged_ids(&self.pool, SEGMENT_MIN_ENGAGEMENT).await?
            }
            TargetAudience::Test { subscriber_ids } => subscriber_ids.clone(),
        };
        Ok(ids)
    }

    /// Render the newsletter, load the recipients and create the send job.
    ///
    /// Ids without a subscriber are skipped.
    pub async fn prepare_batch(
        &self,
        newsletter: &Newsletter,
        subscriber_ids: &[DbId],
        options: BatchOptions,
    ) -> Result<PreparedBatch, PipelineError> {
        if !self.mailer.is_configured() {
            return Err(PipelineError::validation("Mail delivery is not configured"));
        }

        let subscribers = SubscriberRepo::find_by_ids(&self.pool, subscriber_ids).await?;
        if subscribers.is_empty() {
            return Err(PipelineError::validation("No valid subscribers found"));
        }

        let message = EmailMessage::for_newsletter(newsletter)?;
        let batch_size = self
            .config
            .budget
            .clamp_batch_size(options.batch_size.unwrap_or(self.config.batch_size));
        let delay = options.delay.unwrap_or(self.config.batch_delay);
        let total_batches = plan_batches(subscribers.len(), batch_size).len();

        let job = SendJobRepo::create(
            &self.pool,
            newsletter.id,
            subscribers.len() as i32,
            batch_size as i32,
            delay.as_secs() as i64,
            total_batches as i32,
        )
        .await?;

        tracing::info!(
            newsletter_id = newsletter.id,
            send_job_id = job.id,
            recipients = subscribers.len(),
            batch_size,
            total_batches,
            "Send job created",
        );

        Ok(PreparedBatch {
            job,
            message,
            subscribers,
            batch_size,
            delay,
            release_to: initial_status(newsletter.scheduled_at),
        })
    }

    /// Run a prepared batch in the background.
    ///
    /// The send is tracked: [`Sender::shutdown`] stops it at its next batch
    /// boundary and waits for it.
    pub fn spawn_batch(&self, batch: PreparedBatch) {
        let sender = self.clone();
        let newsletter_id = batch.job.newsletter_id;
        self.tasks.spawn(async move {
            if let Err(e) = sender.run_batch(batch).await {
                tracing::error!(newsletter_id, error = %e, "Newsletter send failed");
            }
        });
    }

    /// Interrupt every background send and wait until each has recorded
    /// where it stopped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        tracing::info!(running = self.tasks.len(), "Stopping background sends");
        self.tasks.wait().await;
    }

    /// Fail send jobs whose process died mid-send and hand their newsletters
    /// back, so they can be sent again to the recipients still missing.
    /// Returns the number of jobs recovered.
    pub async fn recover_abandoned_sends(&self) -> Result<usize, PipelineError> {
        let stale_before = Utc::now() - chrono::Duration::seconds(ABANDONED_AFTER_SECS);
        let jobs = SendJobRepo::fail_abandoned(&self.pool, stale_before, ABANDONED_ERROR).await?;

        for job in &jobs {
            if let Some(newsletter) = NewsletterRepo::find_by_id(&self.pool, job.newsletter_id).await? {
                let status = initial_status(newsletter.scheduled_at);
                NewsletterRepo::release_claim(&self.pool, newsletter.id, status).await?;
                tracing::warn!(
                    newsletter_id = newsletter.id,
                    send_job_id = job.id,
                    sent = job.sent_count,
                    status,
                    "Abandoned send recovered",
                );
            }
        }
        Ok(jobs.len())
    }

    /// Send every batch, then mark the job completed and the newsletter sent.
    ///
    /// A database failure mid-send marks the job failed and leaves the
    /// newsletter in `sending`, so it is never sent twice automatically. An
    /// interrupted send marks the job failed and returns the newsletter to
    /// draft or scheduled.
    pub async fn run_batch(&self, batch: PreparedBatch) -> Result<SendJob, PipelineError> {
        let job_id = batch.job.id;
        match self.run_batches(&batch).await {
            Ok(job) => Ok(job),
            Err(PipelineError::Interrupted) => {
                SendJobRepo::fail(&self.pool, job_id, &PipelineError::Interrupted.to_string())
                    .await?;
                NewsletterRepo::release_claim(&self.pool, batch.job.newsletter_id, batch.release_to)
                    .await?;
                tracing::warn!(
                    newsletter_id = batch.job.newsletter_id,
                    send_job_id = job_id,
                    status = batch.release_to,
                    "Batch send interrupted, newsletter released",
                );
                Err(PipelineError::Interrupted)
            }
            Err(e) => {
                tracing::error!(send_job_id = job_id, error = %e, "Batch send failed");
                SendJobRepo::fail(&self.pool, job_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn run_batches(&self, batch: &PreparedBatch) -> Result<SendJob, PipelineError> {
        let ranges = plan_batches(batch.subscribers.len(), batch.batch_size);
        let total_batches = ranges.len();

        for (index, range) in ranges.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Interrupted);
            }
            let recipients = &batch.subscribers[range];
            self.wait_for_budget(batch.job.id, recipients.len(), batch.delay)
                .await?;
            SendJobRepo::set_current_batch(&self.pool, batch.job.id, index as i32 + 1).await?;

            let outcomes = join_all(recipients.iter().map(|subscriber| {
                self.send_single_email(&batch.message, subscriber, Some(batch.job.id))
            }))
            .await;

            let sent = outcomes.iter().filter(|o| o.is_sent()).count();
            let failed = outcomes.len() - sent;
            SendJobRepo::add_results(&self.pool, batch.job.id, sent as i32, failed as i32)
                .await?;

            tracing::info!(
                send_job_id = batch.job.id,
                batch = index + 1,
                total_batches,
                sent,
                failed,
                "Batch sent",
            );

            if index + 1 < total_batches && !batch.delay.is_zero() {
                self.pause(batch.job.id, batch.delay).await?;
            }
        }

        let job = SendJobRepo::complete(&self.pool, batch.job.id).await?;
        NewsletterRepo::mark_sent(&self.pool, job.newsletter_id, job.sent_count as i64).await?;

        tracing::info!(
            newsletter_id = job.newsletter_id,
            send_job_id = job.id,
            sent = job.sent_count,
            failed = job.failed_count,
            "Batch send finished",
        );
        Ok(job)
    }

    /// Block until a batch of `batch_len` fits in the hourly and daily budget.
    async fn wait_for_budget(
        &self,
        job_id: DbId,
        batch_len: usize,
        delay: Duration,
    ) -> Result<(), PipelineError> {
        loop {
            let now = Utc::now();
            let last_hour =
                DeliveryRepo::count_sent_since(&self.pool, now - chrono::Duration::hours(1))
                    .await?;
            let last_day =
                DeliveryRepo::count_sent_since(&self.pool, now - chrono::Duration::days(1))
                    .await?;
            if self
                .config
                .budget
                .allows(batch_len, last_hour as u64, last_day as u64)
            {
                return Ok(());
            }
            tracing::warn!(
                last_hour,
                last_day,
                batch_len,
                "Send budget exhausted, waiting before next batch",
            );
            self.pause(job_id, delay.max(MIN_BUDGET_WAIT)).await?;
        }
    }

    /// Sleep between batches, marking the job alive every [`JOB_HEARTBEAT`].
    /// Fails with [`PipelineError::Interrupted`] once shutdown starts.
    async fn pause(&self, job_id: DbId, duration: Duration) -> Result<(), PipelineError> {
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Interrupted),
                _ = tokio::time::sleep(remaining.min(JOB_HEARTBEAT)) => {}
            }
            SendJobRepo::touch(&self.pool, job_id).await?;
        }
    }

    /// Best-effort confirmation email to a new subscriber. Not tracked.
    pub async fn send_subscription_confirmation(
        &self,
        subscriber: &Subscriber,
    ) -> Result<(), MailError> {
        let html = "<p>Thanks for subscribing! You will receive our next newsletter soon.</p>";
        let email = OutgoingEmail::new(
            &subscriber.email,
            subscriber.name.as_deref(),
            "Welcome to our newsletter!",
            html,
        )
        .with_template(self.config.subscription_template_id.clone());
        self.mailer.send(&email).await
    }
}
