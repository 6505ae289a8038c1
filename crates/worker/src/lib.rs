//! Newsroom background worker.
//!
//! Hosts the periodic pipeline jobs: the automation advancer, scheduled
//! newsletter dispatch, bounce processing and list cleaning. Every job is a
//! long-running async function that stops when its [`CancellationToken`]
//! fires.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod config;
pub mod jobs;

pub use config::WorkerConfig;
