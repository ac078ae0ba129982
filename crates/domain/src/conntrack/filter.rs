use std::collections::HashSet;

use super::entity::{IPPROTO_TCP, RawEventRecord};

/// Destination ports watched when none are configured.
pub const DEFAULT_TARGET_PORTS: [u16; 2] = [80, 443];

/// Decides whether a conntrack event is a new TCP connection to one of
/// the watched destination ports.
///
/// The port set is fixed at construction. The filter is total: records
/// missing any required field are simply not interesting.
#[derive(Debug, Clone)]
pub struct PortFilter {
    ports: HashSet<u16>,
}

impl PortFilter {
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ports: ports.into_iter().collect(),
        }
    }

    /// Return the matched destination port when the record qualifies.
    pub fn matched_port(&self, record: &RawEventRecord) -> Option<u16> {
        let origin = record.origin.as_ref()?;
        if origin.protocol? != IPPROTO_TCP {
            return None;
        }
        let dst_port = origin.dst_port?;
        self.ports.contains(&dst_port).then_some(dst_port)
    }

    pub fn is_interesting(&self, record: &RawEventRecord) -> bool {
        self.matched_port(record).is_some()
    }

}

impl Default for PortFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_PORTS)
    }
}
