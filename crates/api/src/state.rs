use std::sync::Arc;

use newsroom_events::EventBus;
use newsroom_pipeline::{Analytics, AutomationEngine, Sender};

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone: everything inside is an `Arc`, a pool handle, or a
/// service that holds those.
#[derive(Clone)]
pub struct AppState {
    pub pool: newsroom_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub event_bus: Arc<EventBus>,
    pub sender: Sender,
    pub automations: AutomationEngine,
    pub analytics: Analytics,
}

impl AppState {
    /// Wire the pipeline services around one pool, mail sender and bus.
    pub fn new(
        pool: newsroom_db::DbPool,
        config: ServerConfig,
        event_bus: Arc<EventBus>,
        sender: Sender,
    ) -> Self {
        Self {
            automations: AutomationEngine::new(pool.clone(), sender.clone()),
            analytics: Analytics::new(pool.clone(), Arc::clone(&event_bus)),
            pool,
            config: Arc::new(config),
            event_bus,
            sender,
        }
    }
}
