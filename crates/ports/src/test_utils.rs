use std::collections::HashMap;
use std::sync::Mutex;

use domain::conntrack::entity::ConnectionObservation;

use crate::secondary::metrics_port::{ConnectionMetrics, EventMetrics, QueryMetrics};
use crate::secondary::observation_sink::ObservationSink;

/// No-op implementation of all metrics sub-traits for use in tests.
///
/// All methods inherit the default no-op implementations from the sub-traits.
pub struct NoopMetrics;

impl ConnectionMetrics for NoopMetrics {}
impl EventMetrics for NoopMetrics {}
impl QueryMetrics for NoopMetrics {}

/// Metrics double that keeps every recorded value in memory.
#[derive(Default)]
pub struct CountingMetrics {
    connections: Mutex<HashMap<u16, u64>>,
    dropped: Mutex<HashMap<String, u64>>,
    queries: Mutex<HashMap<String, u64>>,
}

impl CountingMetrics {
    pub fn connections(&self, port: u16) -> u64 {
        self.connections
            .lock()
            .map(|m| m.get(&port).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn dropped(&self, reason: &str) -> u64 {
        self.dropped
            .lock()
            .map(|m| m.get(reason).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn queries(&self, result: &str) -> u64 {
        self.queries
            .lock()
            .map(|m| m.get(result).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn bump<K: std::hash::Hash + Eq>(map: &Mutex<HashMap<K, u64>>, key: K) {
    if let Ok(mut m) = map.lock() {
        *m.entry(key).or_insert(0) += 1;
    }
}

impl ConnectionMetrics for CountingMetrics {
    fn record_new_connection(&self, dst_port: u16) {
        bump(&self.connections, dst_port);
    }
}

impl EventMetrics for CountingMetrics {
    fn record_event_dropped(&self, reason: &str) {
        bump(&self.dropped, reason.to_string());
    }
}

impl QueryMetrics for CountingMetrics {
    fn record_query(&self, result: &str) {
        bump(&self.queries, result.to_string());
    }
}

/// Sink double that stores every observation it receives.
#[derive(Default)]
pub struct RecordingSink {
    observations: Mutex<Vec<ConnectionObservation>>,
}

impl RecordingSink {
    pub fn observations(&self) -> Vec<ConnectionObservation> {
        self.observations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.observations.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObservationSink for RecordingSink {
    fn record_observation(&self, observation: &ConnectionObservation) {
        if let Ok(mut v) = self.observations.lock() {
            v.push(observation.clone());
        }
    }
}
