pub mod analytics;
pub mod auth;
pub mod automations;
pub mod dashboard;
pub mod newsletters;
pub mod public;
pub mod send_jobs;
pub mod subscribers;
pub mod tracking;
