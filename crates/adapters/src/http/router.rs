use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use super::conntrack_handler::query_connection;
use super::health_handler::{healthz, readyz};
use super::metrics_handler::metrics;
use super::state::AppState;
use super::ui_handler::index;

/// Build the Axum router.
///
/// `/` is only mounted when the web UI is enabled.
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/conntrack/query", get(query_connection));

    let router = if state.web_ui {
        router.route("/", get(index))
    } else {
        router
    };

    router.with_state(state)
}
