//! Automation advancer: sends every due automation email.

use std::time::Duration;

use newsroom_pipeline::AutomationEngine;
use tokio_util::sync::CancellationToken;

use super::ticker;

/// Run the advancer every `period` until `cancel` is triggered.
///
/// Enrollments are leased by the pass itself, so several workers may run
/// this loop against one database.
pub async fn run(engine: AutomationEngine, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Automation advancer started");

    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Automation advancer stopping");
                break;
            }
            _ = interval.tick() => {
                match engine.process_automation_emails().await {
                    Ok(summary) if summary.processed > 0 => {
                        tracing::debug!(
                            processed = summary.processed,
                            sent = summary.sent,
                            errors = summary.errors,
                            "Automation advancer: pass complete",
                        );
                    }
                    Ok(_) => tracing::debug!("Automation advancer: nothing due"),
                    Err(e) => {
                        tracing::error!(error = %e, "Automation advancer: pass failed");
                    }
                }
            }
        }
    }
}
