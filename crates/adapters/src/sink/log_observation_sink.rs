use domain::conntrack::entity::ConnectionObservation;
use ports::secondary::observation_sink::ObservationSink;

/// Observation sink that emits one structured log line per connection.
///
/// Each observation is logged at INFO level with `type = "conntrack"`
/// so that NAT records can be filtered out of the operational logs.
pub struct LogObservationSink;

impl ObservationSink for LogObservationSink {
    fn record_observation(&self, observation: &ConnectionObservation) {
        tracing::info!(
            r#type = "conntrack",
            dst_port = observation.dst_port,
            src_ip = %observation.origin.src_ip,
            src_port = observation.origin.src_port,
            dst_ip = %observation.origin.dst_ip,
            snat_ip = %observation.nat_ip,
            snat_port = observation.nat_port,
            "new_connection"
        );
    }
}
