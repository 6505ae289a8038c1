//! Email delivery through an HTTP relay service.
//!
//! [`RelayMailer`] POSTs `{service_id, template_id, user_id,
//! template_params}` as JSON to the relay endpoint, the request shape used by
//! EmailJS-style services. The relay renders its template with the params.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{MailError, Mailer, OutgoingEmail};

/// Default relay endpoint when `RELAY_ENDPOINT` is not set.
const DEFAULT_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest relay response body kept in an error.
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub endpoint: String,
    pub service_id: String,
    /// Template used when an email does not name one.
    pub template_id: String,
    /// Public key / user id of the relay account.
    pub user_id: String,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `RELAY_SERVICE_ID` is not set.
    ///
    /// | Variable            | Required | Default                 |
    /// |---------------------|----------|-------------------------|
    /// | `RELAY_SERVICE_ID`  | yes      | -                       |
    /// | `RELAY_TEMPLATE_ID` | no       | `newsletter_template`   |
    /// | `RELAY_USER_ID`     | no       | empty                   |
    /// | `RELAY_ENDPOINT`    | no       | EmailJS send endpoint   |
    pub fn from_env() -> Option<Self> {
        let service_id = std::env::var("RELAY_SERVICE_ID").ok()?;
        Some(Self {
            endpoint: std::env::var("RELAY_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            service_id,
            template_id: std::env::var("RELAY_TEMPLATE_ID")
                .unwrap_or_else(|_| "newsletter_template".to_string()),
            user_id: std::env::var("RELAY_USER_ID").unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// RelayMailer
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RelayRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: serde_json::Value,
}

pub struct RelayMailer {
    client: reqwest::Client,
    config: RelayConfig,
}

impl RelayMailer {
    pub fn new(config: RelayConfig) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body<'a>(&'a self, email: &'a OutgoingEmail) -> RelayRequest<'a> {
        RelayRequest {
            service_id: &self.config.service_id,
            template_id: email
                .template_id
                .as_deref()
                .unwrap_or(&self.config.template_id),
            user_id: &self.config.user_id,
            template_params: email.template_params(),
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    fn provider(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY);
            return Err(MailError::Relay {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %email.to_email, "Email accepted by relay");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
