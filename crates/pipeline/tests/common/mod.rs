#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use newsroom_db::models::subscriber::{CreateSubscriber, Subscriber};
use newsroom_db::repositories::SubscriberRepo;
use newsroom_events::{MailError, Mailer, OutgoingEmail};
use newsroom_pipeline::{DeliveryConfig, Sender};
use sqlx::PgPool;

/// Records every email. Recipients starting with `hard` are rejected as
/// invalid, `soft` ones get a mailbox-full reply and `outage` ones hit a
/// relay that is down.
#[derive(Default)]
pub struct TestMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl TestMailer {
    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.to_email.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for TestMailer {
    fn provider(&self) -> &'static str {
        "test"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if email.to_email.starts_with("hard") {
            return Err(MailError::InvalidRecipient(email.to_email.clone()));
        }
        if email.to_email.starts_with("soft") {
            return Err(MailError::SmtpReply {
                code: 452,
                message: "mailbox full".into(),
            });
        }
        if email.to_email.starts_with("outage") {
            return Err(MailError::Relay {
                status: 503,
                body: "try later".into(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn test_config() -> DeliveryConfig {
    DeliveryConfig {
        app_url: "https://news.example.com".into(),
        batch_delay: std::time::Duration::ZERO,
        ..DeliveryConfig::default()
    }
}

pub fn sender(pool: &PgPool) -> (Sender, Arc<TestMailer>) {
    let mailer = Arc::new(TestMailer::default());
    let sender = Sender::new(pool.clone(), mailer.clone(), test_config());
    (sender, mailer)
}

pub async fn subscriber(pool: &PgPool, email: &str) -> Subscriber {
    SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            email: email.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap()
}

/// Fails every send the way a relay rejects a revoked account key.
pub struct RejectedAccountMailer;

#[async_trait]
impl Mailer for RejectedAccountMailer {
    fn provider(&self) -> &'static str {
        "test"
    }

    async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
        Err(MailError::Relay {
            status: 401,
            body: "The Public Key is invalid".into(),
        })
    }
}
