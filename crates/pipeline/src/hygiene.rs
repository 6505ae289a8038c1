//! Bounce processing and subscriber list cleaning.

use chrono::Utc;
use newsroom_core::bounce::{self, BounceKind, BounceOutcome};
use newsroom_core::hygiene::{self, inactivity_cutoff, CleanupAction, INACTIVE_REASON};
use newsroom_db::repositories::{DeliveryRepo, SubscriberRepo};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::PipelineError;

/// Failed deliveries read per query while processing bounces.
const BOUNCE_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BounceSummary {
    pub hard_bounces: u64,
    pub soft_bounces: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub removed: u64,
    pub updated: u64,
}

/// Apply every unprocessed bounce to its subscriber.
///
/// Only failures logged with a bounce kind are read; account and transport
/// failures never touch a subscriber. A soft bounce that reaches the limit
/// marks the subscriber bounced and counts as hard.
pub async fn process_bounces(pool: &PgPool) -> Result<BounceSummary, PipelineError> {
    let mut summary = BounceSummary::default();

    loop {
        let failures = DeliveryRepo::list_unprocessed_failures(pool, BOUNCE_PAGE_SIZE).await?;
        if failures.is_empty() {
            break;
        }

        for delivery in failures {
            let kind = delivery
                .bounce_kind
                .as_deref()
                .and_then(|k| k.parse::<BounceKind>().ok());
            let subscriber = match (kind, delivery.subscriber_id) {
                (Some(_), Some(id)) => SubscriberRepo::find_by_id(pool, id).await?,
                _ => None,
            };

            if let (Some(kind), Some(subscriber)) = (kind, subscriber) {
                let outcome = bounce::classify(kind, subscriber.soft_bounce_count);
                match &outcome {
                    BounceOutcome::MarkBounced { reason } => {
                        SubscriberRepo::mark_bounced(pool, subscriber.id, reason).await?;
                    }
                    BounceOutcome::CountSoft { soft_bounce_count } => {
                        SubscriberRepo::record_soft_bounce(pool, subscriber.id, *soft_bounce_count)
                            .await?;
                    }
                }
                if outcome.is_hard() {
                    summary.hard_bounces += 1;
                } else {
                    summary.soft_bounces += 1;
                }
            }

            DeliveryRepo::mark_processed(pool, delivery.id).await?;
        }
    }

    tracing::info!(
        hard = summary.hard_bounces,
        soft = summary.soft_bounces,
        "Bounces processed",
    );
    Ok(summary)
}

/// Archive and delete bounced and unsubscribed subscribers, and move active
/// subscribers without a recent open to `inactive`.
pub async fn clean_subscriber_list(pool: &PgPool) -> Result<CleanupSummary, PipelineError> {
    let now = Utc::now();
    let mut summary = CleanupSummary::default();

    for subscriber in SubscriberRepo::cleanup_candidates(pool, inactivity_cutoff(now)).await? {
        match hygiene::classify(&subscriber.status, subscriber.last_opened_at, now) {
            CleanupAction::Remove { reason } => {
                if SubscriberRepo::archive_and_delete(pool, subscriber.id, reason)
                    .await?
                    .is_some()
                {
                    summary.removed += 1;
                }
            }
            CleanupAction::MarkInactive => {
                if SubscriberRepo::mark_inactive(pool, subscriber.id, INACTIVE_REASON).await? {
                    summary.updated += 1;
                }
            }
            CleanupAction::Keep => {}
        }
    }

    tracing::info!(
        removed = summary.removed,
        updated = summary.updated,
        "Subscriber list cleaned",
    );
    Ok(summary)
}
