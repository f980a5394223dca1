//! Shared application state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::bridge::{BridgeContext, BridgeSettings};
use crate::core::lifecycle::{HttpResultsReporter, LifecycleManager, ResultsReporter};
use crate::core::realtime::{OpenAIRealtimeConnector, RealtimeConnector};
use crate::core::session::SessionRegistry;

/// State handed to every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub settings: Arc<BridgeSettings>,
}

impl AppState {
    /// Build the production state: OpenAI realtime legs and, when a results
    /// URL is configured, an HTTP results reporter.
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let reporter: Option<Arc<dyn ResultsReporter>> = match config.results_url.as_deref() {
            Some(url) => {
                info!(url = %url, "Posting end-of-call reports to results collector");
                Some(Arc::new(
                    HttpResultsReporter::new(url).with_timeout(config.results_timeout()),
                ))
            }
            None => {
                info!("No results URL configured, end-of-call reports are disabled");
                None
            }
        };

        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set, AI legs will fail to open");
        }

        Self::with_components(config, Arc::new(OpenAIRealtimeConnector), reporter)
    }

    /// Build state around caller-supplied collaborators.
    pub fn with_components(
        config: ServerConfig,
        connector: Arc<dyn RealtimeConnector>,
        reporter: Option<Arc<dyn ResultsReporter>>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new(config.session_defaults()));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&sessions),
            reporter,
            config.lifecycle_config(),
        ));
        let settings = Arc::new(config.bridge_settings());

        Arc::new(Self {
            config,
            sessions,
            lifecycle,
            connector,
            settings,
        })
    }

    /// Dependencies for one telephony connection.
    pub fn bridge_context(&self) -> BridgeContext {
        BridgeContext {
            registry: Arc::clone(&self.sessions),
            lifecycle: Arc::clone(&self.lifecycle),
            connector: Arc::clone(&self.connector),
            settings: Arc::clone(&self.settings),
        }
    }
}
