use super::entity::{ConnectionObservation, RawEventRecord, Tuple, ip_string};

/// Project a filtered conntrack record into a [`ConnectionObservation`].
///
/// Best effort over partial records: every missing field becomes an
/// empty string or zero. `dst_port` is the port the filter matched.
pub fn extract_observation(record: &RawEventRecord, dst_port: u16) -> ConnectionObservation {
    let origin = record.origin.as_ref().map(Tuple::from).unwrap_or_default();
    let reply = record.reply.as_ref();

    ConnectionObservation {
        dst_port,
        origin,
        nat_ip: ip_string(reply.and_then(|t| t.dst_ip)),
        nat_port: reply.and_then(|t| t.dst_port).unwrap_or(0),
    }
}
