use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use adapters::http::{AppState, bind, run_http_server};
use adapters::netlink::event_reader::NetlinkEventReader;
use adapters::netlink::query_source::NetlinkQuerySource;
use adapters::sink::log_observation_sink::LogObservationSink;
use anyhow::Context;
use application::conntrack_query_service_impl::ConnTrackQueryService;
use application::conntrack_watcher::ConntrackWatcher;
use domain::conntrack::filter::PortFilter;
use infrastructure::config::{AgentConfig, LogFormat, LogLevel};
use infrastructure::constants::{EVENT_CHANNEL_CAPACITY, GRACEFUL_SHUTDOWN_TIMEOUT};
use infrastructure::logging::{LogGuard, init_logging};
use infrastructure::metrics::AgentMetrics;
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Run the watcher startup sequence and block until shutdown.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let config = AgentConfig::load(Path::new(&cli.config))
        .with_context(|| format!("failed to load config from {}", cli.config))?;

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over config file
    let log_level = cli.log_level.unwrap_or(config.log.level);
    let log_format = cli.log_format.unwrap_or(config.log.format);
    let log_guard = init_logging(&config.log, log_level, log_format)?;

    // Root span fields appear in every subsequent log entry, spawned
    // tasks included
    let root_span = tracing::info_span!(
        "service",
        service.name = "conntrack-watch",
        service.version = env!("CARGO_PKG_VERSION"),
    );

    let result = serve(cli, &config, &log_guard, log_level, log_format)
        .instrument(root_span)
        .await;

    log_guard.flush();
    drop(log_guard);
    result
}

async fn serve(
    cli: &Cli,
    config: &AgentConfig,
    log_guard: &LogGuard,
    log_level: LogLevel,
    log_format: LogFormat,
) -> anyhow::Result<()> {
    let target_ports = config.target_ports();
    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        log_file = ?log_guard.path(),
        ports = ?target_ports,
        "conntrack-watch starting"
    );

    // ── 3. Initialize metrics ───────────────────────────────────────
    let metrics = Arc::new(AgentMetrics::new());
    let metrics_port = Arc::clone(&metrics) as Arc<dyn MetricsPort>;

    // ── 4. Register the event subscription ──────────────────────────
    let subscription_live = Arc::new(AtomicBool::new(false));
    let reader = NetlinkEventReader::subscribe(Arc::clone(&subscription_live))
        .context("failed to subscribe to conntrack events")?;

    // ── 5. Build the watcher ────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let watcher = ConntrackWatcher::new(
        PortFilter::new(target_ports),
        Arc::new(LogObservationSink),
        Arc::clone(&metrics_port),
    );

    let cancel_token = create_shutdown_token();

    // ── 6. Spawn event reader and watcher ───────────────────────────
    let reader_handle = spawn_traced(reader.run(
        event_tx,
        Arc::clone(&metrics_port),
        cancel_token.clone(),
    ));
    let watcher_handle = spawn_traced(watcher.run(event_rx, cancel_token.clone()));

    // ── 7. Spawn HTTP server (metrics + query API) ──────────────────
    let http_handle = if config.prometheus.enabled {
        let addr = config.prometheus.bind_addr()?;
        let listener = bind(&addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;

        let query_service = Arc::new(ConnTrackQueryService::new(
            Arc::new(NetlinkQuerySource::new()),
            Arc::clone(&metrics_port),
            config.query.timeout(),
        ));
        let app_state = Arc::new(
            AppState::new(Arc::clone(&metrics), query_service, subscription_live)
                .with_web_ui(config.web_ui.enabled),
        );
        let http_shutdown = cancel_token.clone();
        Some(spawn_traced(async move {
            if let Err(e) =
                run_http_server(app_state, listener, http_shutdown.cancelled_owned()).await
            {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }))
    } else {
        info!("prometheus disabled, HTTP server not started");
        None
    };

    // ── 8. Ready, wait for cancellation ─────────────────────────────
    info!("conntrack-watch ready, waiting for shutdown signal");
    cancel_token.cancelled().await;

    // ── 9. Ordered shutdown sequence ────────────────────────────────
    info!("shutdown phase 1: draining HTTP connections");
    if let Some(handle) = http_handle {
        join_with_timeout("http server", handle).await;
    }

    info!("shutdown phase 2: closing event subscription");
    join_with_timeout("event reader", reader_handle).await;

    info!("shutdown phase 3: draining queued events");
    join_with_timeout("watcher", watcher_handle).await;

    info!("conntrack-watch stopped");
    Ok(())
}

/// Spawn a task that stays inside the caller's span.
fn spawn_traced<F>(task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(task.in_current_span())
}

async fn join_with_timeout(task: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task, error = %e, "task ended abnormally"),
        Err(_) => warn!(
            task,
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
            "task did not stop in time"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn spawned_tasks_log_inside_root_span() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(capture.clone())
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let span = tracing::info_span!("service", service.name = "conntrack-watch");
        let handle = async { spawn_traced(async { info!("new_connection") }) }
            .instrument(span)
            .await;
        handle.await.unwrap();

        let out = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["message"], "new_connection");
        assert_eq!(line["span"]["service.name"], "conntrack-watch");
    }
}
