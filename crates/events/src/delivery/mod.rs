//! Outbound email delivery.
//!
//! Everything that sends mail goes through the [`Mailer`] trait. Two real
//! transports exist: [`SmtpMailer`](email::SmtpMailer) over lettre and
//! [`RelayMailer`](relay::RelayMailer), an HTTP JSON email relay. Without
//! configuration [`DisabledMailer`] fails every send.

pub mod email;
pub mod relay;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use newsroom_core::bounce::BounceKind;
use serde_json::json;

use self::email::{EmailConfig, SmtpMailer};
use self::relay::{RelayConfig, RelayMailer};

/// Recipient name used when a subscriber has none.
pub const DEFAULT_RECIPIENT_NAME: &str = "Subscriber";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The configured sender address could not be parsed.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// The recipient address could not be parsed.
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The SMTP server answered with a negative reply code.
    #[error("SMTP server replied {code}: {message}")]
    SmtpReply { code: u16, message: String },

    /// Connection, TLS or protocol trouble without a reply code.
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay answered with a non-2xx status.
    #[error("Email relay returned HTTP {status}: {body}")]
    Relay { status: u16, body: String },

    #[error("Mail delivery is not configured")]
    NotConfigured,
}

impl MailError {
    /// The bounce this failure amounts to, if it says anything about the
    /// recipient at all.
    ///
    /// Only an unparseable recipient and the SMTP mailbox replies count.
    /// Authentication, configuration, template and transport failures are
    /// `None`: they would fail for every recipient alike.
    pub fn bounce_kind(&self) -> Option<BounceKind> {
        match self {
            Self::InvalidRecipient(_) => Some(BounceKind::Hard),
            Self::SmtpReply { code, .. } => smtp_bounce_kind(*code),
            Self::InvalidAddress(_)
            | Self::Build(_)
            | Self::Smtp(_)
            | Self::Request(_)
            | Self::Relay { .. }
            | Self::NotConfigured => None,
        }
    }
}

/// Bounce kind of an SMTP reply code.
///
/// 550/551/553 reject the mailbox itself. 450/452/552 report a mailbox that
/// is busy or full. Every other code (e.g. 535 authentication failed, 421
/// service unavailable) is about the server or the account.
pub fn smtp_bounce_kind(code: u16) -> Option<BounceKind> {
    match code {
        550 | 551 | 553 => Some(BounceKind::Hard),
        450 | 452 | 552 => Some(BounceKind::Soft),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// OutgoingEmail
// ---------------------------------------------------------------------------

/// One rendered email to one recipient.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
    /// Heading shown by relay templates.
    pub email_title: String,
    /// Relay template to use instead of the configured default.
    pub template_id: Option<String>,
    /// Human-readable send date, e.g. `October 18, 2026`.
    pub date: String,
}

impl OutgoingEmail {
    pub fn new(
        to_email: impl Into<String>,
        to_name: Option<&str>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        Self {
            to_email: to_email.into(),
            to_name: to_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(DEFAULT_RECIPIENT_NAME)
                .to_string(),
            email_title: subject.clone(),
            subject,
            html: html.into(),
            template_id: None,
            date: Utc::now().format("%B %-d, %Y").to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.email_title = title.into();
        self
    }

    pub fn with_template(mut self, template_id: Option<String>) -> Self {
        self.template_id = template_id;
        self
    }

    /// Parameters handed to relay templates.
    pub fn template_params(&self) -> serde_json::Value {
        json!({
            "to_email": self.to_email,
            "to_name": self.to_name,
            "subject": self.subject,
            "message_html": self.html,
            "email_title": self.email_title,
            "date": self.date,
        })
    }
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Async email transport.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Short transport name stored with every delivery row.
    fn provider(&self) -> &'static str;

    /// `false` when sends can never succeed, so batch work is not started.
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Fails every send. Used when neither SMTP nor a relay is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    fn provider(&self) -> &'static str {
        "disabled"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

/// Pick the transport from the environment: SMTP when `SMTP_HOST` is set,
/// else the HTTP relay when `RELAY_SERVICE_ID` is set, else disabled.
pub fn mailer_from_env() -> Result<Arc<dyn Mailer>, MailError> {
    if let Some(config) = EmailConfig::from_env() {
        tracing::info!(host = %config.smtp_host, "Using SMTP mailer");
        return Ok(Arc::new(SmtpMailer::new(config)?));
    }
    if let Some(config) = RelayConfig::from_env() {
        tracing::info!(endpoint = %config.endpoint, "Using HTTP relay mailer");
        return Ok(Arc::new(RelayMailer::new(config)?));
    }
    tracing::warn!("No mail transport configured, outgoing email is disabled");
    Ok(Arc::new(DisabledMailer))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
