//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PlatformEvent`]s. It is
//! shared via `Arc<EventBus>` between the HTTP handlers, the pipeline and the
//! trigger router that starts automations.

use chrono::{DateTime, Utc};
use newsroom_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A subscriber was added (public subscribe or admin create).
pub const SUBSCRIBER_CREATED: &str = "subscriber.created";

/// A tag was added to a subscriber. Payload carries `tag`.
pub const SUBSCRIBER_TAG_ADDED: &str = "subscriber.tag_added";

/// A tracking pixel was loaded for the first or a later time.
pub const EMAIL_OPENED: &str = "email.opened";

/// A tracked link was followed. Payload carries `url`.
pub const LINK_CLICKED: &str = "link.clicked";

/// An application-defined event posted through the triggers endpoint.
pub const CUSTOM_EVENT: &str = "custom.event";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// Something that happened to a subscriber or a newsletter.
///
/// Built with [`PlatformEvent::new`] and the `with_*` builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"subscriber.created"`.
    pub event_type: String,

    /// Subscriber the event is about, when there is one.
    pub subscriber_id: Option<DbId>,

    /// Newsletter the event is about, when there is one.
    pub newsletter_id: Option<DbId>,

    /// Admin user that caused the event.
    pub actor_user_id: Option<DbId>,

    /// Event-specific data. Trigger conditions are matched against it.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            subscriber_id: None,
            newsletter_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_subscriber(mut self, subscriber_id: DbId) -> Self {
        self.subscriber_id = Some(subscriber_id);
        self
    }

    pub fn with_newsletter(mut self, newsletter_id: DbId) -> Self {
        self.newsletter_id = Some(newsletter_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use newsroom_events::bus::{EventBus, PlatformEvent, SUBSCRIBER_CREATED};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlatformEvent::new(SUBSCRIBER_CREATED).with_subscriber(1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped when nobody
    /// listens.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
