use anyhow::Context;
use newsroom_events::mailer_from_env;
use newsroom_pipeline::{DeliveryConfig, Sender};
use newsroom_worker::{jobs, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsroom_worker=debug,newsroom_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    // --- Database ---
    let pool = newsroom_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    newsroom_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    newsroom_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Delivery ---
    let mailer = mailer_from_env().context("Failed to configure mail delivery")?;
    if !mailer.is_configured() {
        tracing::warn!("No mail transport configured, automation and scheduled sends are skipped");
    }
    let sender = Sender::new(pool.clone(), mailer, DeliveryConfig::from_env());

    // --- Jobs ---
    let cancel = CancellationToken::new();
    let handles = jobs::spawn_all(pool, sender.clone(), &config, &cancel);
    tracing::info!(jobs = handles.len(), "Worker started");

    shutdown_signal().await;
    cancel.cancel();

    let all_stopped = join_jobs(handles);
    if tokio::time::timeout(config.shutdown_timeout, all_stopped)
        .await
        .is_err()
    {
        tracing::warn!("Jobs did not stop in time");
    }

    // Scheduled sends stop at their next batch boundary and are resumed by
    // the next worker.
    if tokio::time::timeout(config.shutdown_timeout, sender.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Scheduled sends did not stop in time");
    }

    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for every job, logging any that panicked.
async fn join_jobs(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Job ended abnormally");
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
