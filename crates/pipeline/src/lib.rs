//! Newsroom delivery pipeline.
//!
//! Everything between the repositories and the HTTP/worker surfaces:
//!
//! - [`Sender`]: tracked single sends and throttled batch sends.
//! - [`AutomationEngine`]: automation CRUD, enrollment, triggers and the
//!   sequence advancer.
//! - [`Analytics`]: open/click recording and reports.
//! - [`hygiene`]: bounce processing and list cleaning.
//! - [`ScheduledDispatch`]: sending of due scheduled newsletters.

pub mod analytics;
pub mod automation;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hygiene;
pub mod sender;

pub use analytics::Analytics;
pub use automation::AutomationEngine;
pub use config::DeliveryConfig;
pub use dispatch::ScheduledDispatch;
pub use error::PipelineError;
pub use sender::{BatchOptions, EmailMessage, PreparedBatch, SendOutcome, Sender};
