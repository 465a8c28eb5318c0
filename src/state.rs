//! Shared application state.

use std::sync::Arc;

use tracing::warn;

use crate::config::ServerConfig;
use crate::core::call::{CallEventBus, CallTracker};
use crate::core::realtime::{BackendConnector, OpenAIRealtimeConnector};
use crate::core::session::SessionRegistry;

/// State shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub tracker: Arc<CallTracker>,
}

impl AppState {
    /// Build state that connects calls to the OpenAI Realtime API.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        if !config.has_api_key() {
            warn!("OPENAI_API_KEY is not set; calls will fail to reach the backend");
        }
        Self::with_connector(config, Arc::new(OpenAIRealtimeConnector))
    }

    /// Build state around an arbitrary backend connector.
    pub fn with_connector(config: ServerConfig, connector: Arc<dyn BackendConnector>) -> Arc<Self> {
        let tracker = Arc::new(CallTracker::new(CallEventBus::default()));
        let registry = SessionRegistry::new(connector, config.bridge_settings(), Arc::clone(&tracker))
            .with_max_sessions(config.max_concurrent_calls);

        Arc::new(Self {
            config,
            registry: Arc::new(registry),
            tracker,
        })
    }
}
