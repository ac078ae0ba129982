use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use application::conntrack_query_service_impl::ConnTrackQueryService;
use infrastructure::metrics::AgentMetrics;

/// Shared application state for the HTTP server.
///
/// Passed to Axum handlers via `State(Arc<AppState>)`.
pub struct AppState {
    pub metrics: Arc<AgentMetrics>,
    pub query_service: Arc<ConnTrackQueryService>,
    /// Set while the conntrack event subscription is registered.
    pub subscription_live: Arc<AtomicBool>,
    pub web_ui: bool,
}

impl AppState {
    pub fn new(
        metrics: Arc<AgentMetrics>,
        query_service: Arc<ConnTrackQueryService>,
        subscription_live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            metrics,
            query_service,
            subscription_live,
            web_ui: false,
        }
    }

    /// Serve the embedded query page at `/`.
    #[must_use]
    pub fn with_web_ui(mut self, enabled: bool) -> Self {
        self.web_ui = enabled;
        self
    }
}
