use std::sync::Arc;

use axum::extract::State;
use axum::http::header;

use super::state::AppState;

/// Content-Type for `OpenMetrics` text exposition format.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Serves Prometheus metrics in `OpenMetrics` text format.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    let body = state.metrics.encode();
    ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use ports::secondary::metrics_port::ConnectionMetrics;
    use tower::ServiceExt;

    use crate::http::state::test_support::state_with;

    #[test]
    fn content_type_is_valid() {
        assert!(OPENMETRICS_CONTENT_TYPE.starts_with("application/openmetrics-text"));
        assert!(OPENMETRICS_CONTENT_TYPE.contains("version=1.0.0"));
    }

    #[tokio::test]
    async fn exposes_per_port_counter() {
        let state = Arc::new(state_with(Ok(vec![]), true));
        state.metrics.record_new_connection(443);
        state.metrics.record_new_connection(443);
        let router = Router::new()
            .route("/metrics", get(metrics))
            .with_state(state);

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            OPENMETRICS_CONTENT_TYPE
        );

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("conntrack_new_connections_total{port=\"443\"} 2"));
    }
}
