//! Periodic jobs.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All jobs accept a [`CancellationToken`] for
//! graceful shutdown and log failures instead of exiting, so one bad pass
//! never stops the loop.

pub mod automation;
pub mod hygiene;
pub mod scheduled;

use std::time::Duration;

use newsroom_pipeline::{AutomationEngine, ScheduledDispatch, Sender};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Spawn every job. The handles finish once `cancel` fires.
pub fn spawn_all(
    pool: PgPool,
    sender: Sender,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let engine = AutomationEngine::new(pool.clone(), sender.clone());
    let dispatch = ScheduledDispatch::new(pool.clone(), sender);

    vec![
        tokio::spawn(automation::run(
            engine,
            config.automation_interval,
            cancel.clone(),
        )),
        tokio::spawn(scheduled::run(
            dispatch,
            config.scheduled_interval,
            cancel.clone(),
        )),
        tokio::spawn(hygiene::run_bounces(
            pool.clone(),
            config.bounce_interval,
            cancel.clone(),
        )),
        tokio::spawn(hygiene::run_cleanup(
            pool,
            config.hygiene_interval,
            cancel.clone(),
        )),
    ]
}

/// A ticking interval that skips, rather than bursts, ticks missed while a
/// slow pass was running.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
