//! Starts automations from platform events.
//!
//! [`TriggerRouter`] listens on the event bus and hands every subscriber
//! event with a matching trigger type to
//! [`AutomationEngine::handle_trigger_event`].

use newsroom_core::automation::TriggerType;
use newsroom_events::bus::{
    CUSTOM_EVENT, EMAIL_OPENED, LINK_CLICKED, SUBSCRIBER_CREATED, SUBSCRIBER_TAG_ADDED,
};
use newsroom_events::PlatformEvent;
use newsroom_pipeline::AutomationEngine;
use tokio::sync::broadcast;

/// Trigger type an event type fires, if any.
pub fn trigger_for(event_type: &str) -> Option<TriggerType> {
    match event_type {
        SUBSCRIBER_CREATED => Some(TriggerType::Subscription),
        SUBSCRIBER_TAG_ADDED => Some(TriggerType::TagAdded),
        LINK_CLICKED => Some(TriggerType::LinkClicked),
        EMAIL_OPENED => Some(TriggerType::EmailOpened),
        CUSTOM_EVENT => Some(TriggerType::CustomEvent),
        _ => None,
    }
}

/// Trigger data for an event: its payload with `subscriber_id` filled in.
pub fn trigger_data(event: &PlatformEvent) -> Option<serde_json::Value> {
    let subscriber_id = event.subscriber_id?;
    let mut data = match &event.payload {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    data.insert("subscriber_id".into(), subscriber_id.into());
    Some(serde_json::Value::Object(data))
}

pub struct TriggerRouter {
    engine: AutomationEngine,
}

impl TriggerRouter {
    pub fn new(engine: AutomationEngine) -> Self {
        Self { engine }
    }

    /// Consume events until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Trigger router lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, trigger router shutting down");
                    break;
                }
            }
        }
    }

    async fn route(&self, event: &PlatformEvent) {
        let Some(trigger) = trigger_for(&event.event_type) else {
            return;
        };
        let Some(data) = trigger_data(event) else {
            tracing::debug!(event_type = %event.event_type, "Event without subscriber ignored");
            return;
        };

        if let Err(e) = self.engine.handle_trigger_event(trigger, &data).await {
            tracing::error!(
                error = %e,
                event_type = %event.event_type,
                subscriber_id = event.subscriber_id,
                "Failed to handle automation trigger",
            );
        }
    }
}
