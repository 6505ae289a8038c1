//! Delivery settings shared by the sender, the automation engine and the
//! worker.

use std::time::Duration;

use newsroom_core::batching::{
    SendBudget, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_MAX_PER_DAY,
    DEFAULT_MAX_PER_HOUR,
};

/// Base URL used in tracking links when `APP_URL` is not set.
const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Batch sizing, rate limits and outbound URLs.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Public base URL of the API; tracking links point at it.
    pub app_url: String,
    pub batch_size: usize,
    /// Pause between two batches of one send.
    pub batch_delay: Duration,
    pub budget: SendBudget,
    /// Relay template for newsletters and automation emails.
    pub newsletter_template_id: Option<String>,
    /// Relay template for subscription confirmations.
    pub subscription_template_id: Option<String>,
    /// Send a confirmation email to new public subscribers.
    pub send_subscription_confirmation: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            budget: SendBudget::default(),
            newsletter_template_id: None,
            subscription_template_id: None,
            send_subscription_confirmation: false,
        }
    }
}

impl DeliveryConfig {
    /// Load from environment variables with sensible defaults.
    ///
    /// | Env var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `APP_URL`                      | `http://localhost:3000` |
    /// | `SEND_BATCH_SIZE`              | `50`                    |
    /// | `SEND_BATCH_DELAY_SECS`        | `120`                   |
    /// | `SEND_MAX_PER_HOUR`            | `500`                   |
    /// | `SEND_MAX_PER_DAY`             | `2000`                  |
    /// | `NEWSLETTER_TEMPLATE_ID`       | relay default           |
    /// | `SUBSCRIPTION_TEMPLATE_ID`     | relay default           |
    /// | `SEND_SUBSCRIPTION_CONFIRMATION` | `false`               |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let app_url = std::env::var("APP_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.app_url);

        let batch_size = env_parse("SEND_BATCH_SIZE").unwrap_or(defaults.batch_size);

        let batch_delay = env_parse("SEND_BATCH_DELAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.batch_delay);

        let budget = SendBudget {
            max_per_hour: env_parse("SEND_MAX_PER_HOUR").unwrap_or(DEFAULT_MAX_PER_HOUR),
            max_per_day: env_parse("SEND_MAX_PER_DAY").unwrap_or(DEFAULT_MAX_PER_DAY),
        };

        let send_subscription_confirmation =
            env_parse("SEND_SUBSCRIPTION_CONFIRMATION").unwrap_or(false);

        Self {
            app_url,
            batch_size,
            batch_delay,
            budget,
            newsletter_template_id: std::env::var("NEWSLETTER_TEMPLATE_ID").ok(),
            subscription_template_id: std::env::var("SUBSCRIPTION_TEMPLATE_ID").ok(),
            send_subscription_confirmation,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = DeliveryConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.batch_delay, Duration::from_secs(120));
        assert_eq!(config.budget.max_per_hour, 500);
        assert_eq!(config.budget.max_per_day, 2000);
        assert!(!config.send_subscription_confirmation);
    }
}
