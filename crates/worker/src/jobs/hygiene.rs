//! Bounce processing and subscriber list cleaning.

use std::time::Duration;

use newsroom_pipeline::hygiene::{clean_subscriber_list, process_bounces};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use super::ticker;

/// Classify new delivery failures every `period`.
pub async fn run_bounces(pool: PgPool, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Bounce processing started");

    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bounce processing stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = process_bounces(&pool).await {
                    tracing::error!(error = %e, "Bounce processing: pass failed");
                }
            }
        }
    }
}

/// Remove bounced and unsubscribed subscribers and mark inactive ones, every
/// `period`.
pub async fn run_cleanup(pool: PgPool, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "List cleaning started");

    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("List cleaning stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = clean_subscriber_list(&pool).await {
                    tracing::error!(error = %e, "List cleaning: pass failed");
                }
            }
        }
    }
}
