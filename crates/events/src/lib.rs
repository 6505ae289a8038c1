//! Newsroom event bus and outbound mail.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope that automation triggers
//!   react to.
//! - [`delivery`]: the [`Mailer`] seam and its SMTP / HTTP relay
//!   transports.

pub mod bus;
pub mod delivery;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, SmtpMailer};
pub use delivery::relay::{RelayConfig, RelayMailer};
pub use delivery::{
    mailer_from_env, smtp_bounce_kind, DisabledMailer, MailError, Mailer, OutgoingEmail,
};
