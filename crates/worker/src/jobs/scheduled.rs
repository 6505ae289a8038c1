//! Dispatch of scheduled newsletters whose time has come.

use std::time::Duration;

use newsroom_pipeline::ScheduledDispatch;
use tokio_util::sync::CancellationToken;

use super::ticker;

/// Recover abandoned sends and start due scheduled sends every `period`
/// until `cancel` is triggered.
///
/// Sends started here run on the sender's task tracker and are stopped by
/// `Sender::shutdown`, not by `cancel`.
pub async fn run(dispatch: ScheduledDispatch, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Scheduled dispatch started");

    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scheduled dispatch stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = dispatch.dispatch_due().await {
                    tracing::error!(error = %e, "Scheduled dispatch: pass failed");
                }
            }
        }
    }
}
