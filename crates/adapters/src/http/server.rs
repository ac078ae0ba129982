use std::future::Future;
use std::sync::Arc;

use super::router::build_router;
use super::state::AppState;

/// Bind the HTTP listener. `addr` may name a host, which is resolved
/// here. Failing to bind is a startup error.
pub async fn bind(addr: &str) -> anyhow::Result<tokio::net::TcpListener> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    Ok(listener)
}

/// Serve the metrics and query API on `listener`.
///
/// The server shuts down gracefully when `shutdown` resolves, draining
/// in-flight connections before returning.
pub async fn run_http_server(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let router = build_router(state);
    let addr = listener.local_addr()?;

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    use crate::http::state::test_support::state_with;

    #[tokio::test]
    async fn serves_until_cancelled() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();

        let server = tokio::spawn(run_http_server(
            Arc::new(state_with(Ok(vec![]), true)),
            listener,
            async move { shutdown.cancelled().await },
        ));

        let body = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("ok"));

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn binds_host_name() {
        let listener = bind("localhost:0").await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
