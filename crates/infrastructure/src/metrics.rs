use ports::secondary::metrics_port::{ConnectionMetrics, EventMetrics, QueryMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PortLabels {
    pub port: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabels {
    pub reason: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    pub result: String,
}

// ── Agent metrics registry ──────────────────────────────────────────

/// Prometheus metrics registry for the watcher.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. Wrap in `Arc` for multi-task sharing.
pub struct AgentMetrics {
    registry: Registry,
    pub new_connections_total: Family<PortLabels, Counter>,
    pub events_dropped_total: Family<ReasonLabels, Counter>,
    pub queries_total: Family<ResultLabels, Counter>,
}

impl AgentMetrics {
    /// Create a new metrics registry with all metrics registered under
    /// the `conntrack` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("conntrack");

        let new_connections_total = Family::<PortLabels, Counter>::default();
        registry.register(
            "new_connections",
            "New connections observed per watched destination port",
            new_connections_total.clone(),
        );

        let events_dropped_total = Family::<ReasonLabels, Counter>::default();
        registry.register(
            "events_dropped",
            "Conntrack events dropped before reaching the watcher",
            events_dropped_total.clone(),
        );

        let queries_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "queries",
            "Connection queries served, by outcome",
            queries_total.clone(),
        );

        Self {
            registry,
            new_connections_total,
            events_dropped_total,
            queries_total,
        }
    }

    /// Encode all registered metrics to `OpenMetrics` text format.
    ///
    /// Returns whatever was written before a failure; the error is logged.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buffer
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sub-trait implementations ──────────────────────────────────────

impl ConnectionMetrics for AgentMetrics {
    fn record_new_connection(&self, dst_port: u16) {
        self.new_connections_total
            .get_or_create(&PortLabels {
                port: dst_port.to_string(),
            })
            .inc();
    }
}

impl EventMetrics for AgentMetrics {
    fn record_event_dropped(&self, reason: &str) {
        self.events_dropped_total
            .get_or_create(&ReasonLabels {
                reason: reason.to_string(),
            })
            .inc();
    }
}

impl QueryMetrics for AgentMetrics {
    fn record_query(&self, result: &str) {
        self.queries_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }
}
