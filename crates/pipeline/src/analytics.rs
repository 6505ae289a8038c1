//! Open/click recording and reporting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use newsroom_core::analytics::{
    growth_series, growth_window_start, retention_rate, EngagementDistribution, LinkClicks,
    MonthlyGrowth, NewsletterMetrics, GROWTH_MONTHS,
};
use newsroom_core::engagement::{compute_engagement_score, EngagementInput, RECENT_WINDOW};
use newsroom_core::send_time::{optimal_send_time, OptimalSendTime, OPENS_PER_SUBSCRIBER};
use newsroom_core::status::{TRACKING_CLICK, TRACKING_OPEN};
use newsroom_core::types::DbId;
use newsroom_db::models::newsletter::{NewsletterCounts, NewsletterSummary};
use newsroom_db::models::subscriber::{Subscriber, SubscriberCounts};
use newsroom_db::models::tracking::{TrackingEvent, UrlClicks};
use newsroom_db::repositories::{NewsletterRepo, SubscriberRepo, TrackingRepo};
use newsroom_events::bus::{EMAIL_OPENED, LINK_CLICKED};
use newsroom_events::{EventBus, PlatformEvent};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PipelineError;

/// Entries in the dashboard's recent lists.
const DASHBOARD_RECENT: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberAnalytics {
    pub total: i64,
    pub active: i64,
    pub unsubscribed: i64,
    pub retention_rate: f64,
    pub engagement: EngagementDistribution,
    pub growth: Vec<MonthlyGrowth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub subscribers: SubscriberCounts,
    pub newsletters: NewsletterCounts,
    pub recent_newsletters: Vec<NewsletterSummary>,
    pub recent_subscribers: Vec<Subscriber>,
}

#[derive(Clone)]
pub struct Analytics {
    pool: PgPool,
    events: Arc<EventBus>,
}

impl Analytics {
    pub fn new(pool: PgPool, events: Arc<EventBus>) -> Self {
        Self { pool, events }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Register a pixel load.
    pub async fn record_open(&self, tracking_id: Uuid) -> Result<(), PipelineError> {
        let event = self.record_hit(tracking_id, TRACKING_OPEN).await?;

        if let Some(newsletter_id) = event.newsletter_id {
            NewsletterRepo::increment_open(&self.pool, newsletter_id).await?;
        }
        if let Some(subscriber_id) = event.subscriber_id {
            if let Some(subscriber) = SubscriberRepo::record_open(&self.pool, subscriber_id).await?
            {
                self.refresh_engagement(&subscriber).await?;
            }
        }

        self.publish(&event, EMAIL_OPENED, serde_json::json!({}));
        Ok(())
    }

    /// Register a link click and return the URL to redirect to.
    pub async fn record_click(&self, tracking_id: Uuid) -> Result<String, PipelineError> {
        let event = self.record_hit(tracking_id, TRACKING_CLICK).await?;
        let url = event
            .original_url
            .clone()
            .ok_or_else(|| PipelineError::validation("Tracking ID has no URL"))?;

        if let Some(newsletter_id) = event.newsletter_id {
            NewsletterRepo::increment_click(&self.pool, newsletter_id).await?;
        }
        if let Some(subscriber_id) = event.subscriber_id {
            if let Some(subscriber) =
                SubscriberRepo::record_click(&self.pool, subscriber_id).await?
            {
                self.refresh_engagement(&subscriber).await?;
            }
        }

        self.publish(&event, LINK_CLICKED, serde_json::json!({ "url": url }));
        Ok(url)
    }

    async fn record_hit(&self, tracking_id: Uuid, kind: &str) -> Result<TrackingEvent, PipelineError> {
        TrackingRepo::record_hit(&self.pool, tracking_id, kind)
            .await?
            .ok_or(PipelineError::TrackingNotFound)
    }

    /// Recompute and store a subscriber's engagement score.
    pub async fn refresh_engagement(&self, subscriber: &Subscriber) -> Result<i32, PipelineError> {
        let recent =
            TrackingRepo::recent_distinct_emails(&self.pool, subscriber.id, RECENT_WINDOW).await?;
        let input = EngagementInput {
            recent_newsletters: recent,
            open_count: subscriber.open_count,
            click_count: subscriber.click_count,
            last_opened_at: subscriber.last_opened_at,
        };
        let score = compute_engagement_score(&input, Utc::now());
        SubscriberRepo::set_engagement_score(&self.pool, subscriber.id, score).await?;
        Ok(score)
    }

    fn publish(&self, event: &TrackingEvent, event_type: &str, mut payload: serde_json::Value) {
        let Some(subscriber_id) = event.subscriber_id else {
            return;
        };
        if let Some(map) = payload.as_object_mut() {
            map.insert("subscriber_id".into(), subscriber_id.into());
            if let Some(newsletter_id) = event.newsletter_id {
                map.insert("newsletter_id".into(), newsletter_id.into());
            }
        }
        let mut platform_event = PlatformEvent::new(event_type)
            .with_subscriber(subscriber_id)
            .with_payload(payload);
        if let Some(newsletter_id) = event.newsletter_id {
            platform_event = platform_event.with_newsletter(newsletter_id);
        }
        self.events.publish(platform_event);
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    pub async fn newsletter_analytics(
        &self,
        newsletter_id: DbId,
    ) -> Result<NewsletterMetrics, PipelineError> {
        let newsletter = NewsletterRepo::find_by_id(&self.pool, newsletter_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Newsletter", newsletter_id))?;

        let opens = TrackingRepo::unique_openers(&self.pool, newsletter_id).await?;
        let clicks = TrackingRepo::unique_clickers(&self.pool, newsletter_id).await?;
        let links = TrackingRepo::clicks_per_url(&self.pool, newsletter_id)
            .await?
            .into_iter()
            .map(|u| LinkClicks {
                url: u.url,
                clicks: u.clicks,
            })
            .collect();

        Ok(NewsletterMetrics::new(
            newsletter.id,
            newsletter.title,
            newsletter.sent_at,
            newsletter.sent_count,
            opens,
            clicks,
            links,
        ))
    }

    /// CSV report of [`Analytics::newsletter_analytics`].
    pub async fn export_csv(&self, newsletter_id: DbId) -> Result<String, PipelineError> {
        Ok(self.newsletter_analytics(newsletter_id).await?.to_csv())
    }

    /// Clicks per original URL of a newsletter.
    pub async fn heat_map(&self, newsletter_id: DbId) -> Result<Vec<UrlClicks>, PipelineError> {
        if NewsletterRepo::find_by_id(&self.pool, newsletter_id)
            .await?
            .is_none()
        {
            return Err(PipelineError::not_found("Newsletter", newsletter_id));
        }
        Ok(TrackingRepo::clicks_per_url(&self.pool, newsletter_id).await?)
    }

    pub async fn subscriber_analytics(&self) -> Result<SubscriberAnalytics, PipelineError> {
        let now = Utc::now();
        let counts = SubscriberRepo::counts(&self.pool).await?;
        let scores = SubscriberRepo::engagement_scores(&self.pool).await?;

        let signups: HashMap<String, i64> = match growth_window_start(now, GROWTH_MONTHS) {
            Some(since) => SubscriberRepo::monthly_signups(&self.pool, since)
                .await?
                .into_iter()
                .collect(),
            None => HashMap::new(),
        };

        Ok(SubscriberAnalytics {
            total: counts.total,
            active: counts.active,
            unsubscribed: counts.unsubscribed,
            retention_rate: retention_rate(counts.total, counts.unsubscribed),
            engagement: EngagementDistribution::from_scores(scores),
            growth: growth_series(now, &signups),
        })
    }

    /// Best weekday and hour (UTC) to reach the given subscribers.
    pub async fn optimal_send_time(
        &self,
        subscriber_ids: &[DbId],
    ) -> Result<OptimalSendTime, PipelineError> {
        let opens =
            TrackingRepo::recent_open_times(&self.pool, subscriber_ids, OPENS_PER_SUBSCRIBER)
                .await?;
        Ok(optimal_send_time(&opens))
    }

    pub async fn dashboard(&self) -> Result<Dashboard, PipelineError> {
        Ok(Dashboard {
            subscribers: SubscriberRepo::counts(&self.pool).await?,
            newsletters: NewsletterRepo::counts(&self.pool).await?,
            recent_newsletters: NewsletterRepo::recent(&self.pool, DASHBOARD_RECENT).await?,
            recent_subscribers: SubscriberRepo::recent(&self.pool, DASHBOARD_RECENT).await?,
        })
    }
}
