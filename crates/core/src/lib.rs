//! Domain types and pure logic for the newsroom newsletter service.
//!
//! Nothing in this crate performs I/O. The database, mail delivery and HTTP
//! layers call into these modules for validation, scoring, content rewriting
//! and scheduling arithmetic.

pub mod analytics;
pub mod automation;
pub mod batching;
pub mod bounce;
pub mod engagement;
pub mod error;
pub mod hygiene;
pub mod newsletter;
pub mod roles;
pub mod send_time;
pub mod status;
pub mod subscriber;
pub mod template;
pub mod tracking;
pub mod types;
