use std::sync::Arc;

use domain::conntrack::entity::RawEventRecord;
use domain::conntrack::extractor::extract_observation;
use domain::conntrack::filter::PortFilter;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::observation_sink::ObservationSink;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Consumes conntrack "new" events and reports connections to the
/// watched destination ports.
///
/// Events that do not pass the [`PortFilter`] are ignored silently. Each
/// qualifying event produces exactly one sink call and one counter
/// increment for its destination port.
pub struct ConntrackWatcher {
    filter: PortFilter,
    sink: Arc<dyn ObservationSink>,
    metrics: Arc<dyn MetricsPort>,
}

impl ConntrackWatcher {
    pub fn new(
        filter: PortFilter,
        sink: Arc<dyn ObservationSink>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        Self {
            filter,
            sink,
            metrics,
        }
    }

    /// Process one event. Returns `true` when it was reported.
    pub fn handle_event(&self, record: &RawEventRecord) -> bool {
        let Some(dst_port) = self.filter.matched_port(record) else {
            return false;
        };

        let observation = extract_observation(record, dst_port);
        self.sink.record_observation(&observation);
        self.metrics.record_new_connection(dst_port);
        true
    }

    /// Main event loop. Drains buffered events on cancellation and
    /// stops when the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<RawEventRecord>, cancel_token: CancellationToken) {
        let mut total: u64 = 0;
        let mut reported: u64 = 0;

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    while let Ok(record) = rx.try_recv() {
                        total += 1;
                        reported += u64::from(self.handle_event(&record));
                    }
                    break;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(record) => {
                            total += 1;
                            reported += u64::from(self.handle_event(&record));
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(total_events = total, reported, "conntrack watcher stopped");
    }
}
