// Focused sub-traits for recording Prometheus metrics.
//
// All methods take `&self` because the underlying implementation uses
// atomic operations (interior mutability via `prometheus-client`).
//
// Default implementations are no-ops, allowing test mocks to implement
// only the sub-traits relevant to the service under test.

// ── Connection metrics ─────────────────────────────────────────────

pub trait ConnectionMetrics: Send + Sync {
    /// Count a new connection to a watched destination port.
    fn record_new_connection(&self, _dst_port: u16) {}
}

// ── Event pipeline metrics ─────────────────────────────────────────

pub trait EventMetrics: Send + Sync {
    /// Record a dropped event with a reason label.
    fn record_event_dropped(&self, _reason: &str) {}
}

// ── Query metrics ──────────────────────────────────────────────────

pub trait QueryMetrics: Send + Sync {
    /// Record a query outcome (`found`, `not_found`, `error`, `timeout`).
    fn record_query(&self, _result: &str) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port composing all sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>`.
pub trait MetricsPort: ConnectionMetrics + EventMetrics + QueryMetrics {}

impl<T> MetricsPort for T where T: ConnectionMetrics + EventMetrics + QueryMetrics {}
