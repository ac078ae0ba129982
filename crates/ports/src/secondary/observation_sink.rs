use domain::conntrack::entity::ConnectionObservation;

/// Destination for observed NAT connections.
///
/// Called once per qualifying event from the event pipeline, so
/// implementations must not block for long.
pub trait ObservationSink: Send + Sync {
    fn record_observation(&self, observation: &ConnectionObservation);
}
