use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::entity::{ConnectionStatus, IPPROTO_TCP, QueryParams, RawEventRecord, TcpState, Tuple};
use super::error::ConnTrackError;

/// A point lookup against the conntrack table, keyed on the reply tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConntrackQuery {
    pub protocol: u8,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ConntrackQuery {
    /// Translate client parameters into a lookup.
    ///
    /// Never fails: addresses that do not parse become the unspecified
    /// address of the query family, which matches no entry.
    pub fn from_params(params: &QueryParams) -> Self {
        let src = parse_ip(&params.src_ip);
        let dst = parse_ip(&params.dst_ip);
        let v6 = match (src, dst) {
            (Some(ip), _) | (None, Some(ip)) => ip.is_ipv6(),
            (None, None) => false,
        };

        Self {
            protocol: params.protocol.number(),
            src_ip: within_family(src, v6),
            dst_ip: within_family(dst, v6),
            src_port: params.src_port,
            dst_port: params.dst_port,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.src_ip.is_ipv6()
    }
}

fn parse_ip(s: &str) -> Option<IpAddr> {
    s.trim().parse().ok()
}

fn within_family(ip: Option<IpAddr>, v6: bool) -> IpAddr {
    match ip {
        Some(ip) if ip.is_ipv6() == v6 => ip,
        _ if v6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    }
}

/// Copy a matched record into a [`ConnectionStatus`].
///
/// The TCP state is only reported for TCP entries. When the record does
/// not carry its own protocol number the query protocol is assumed.
pub fn status_from_record(record: &RawEventRecord, query_protocol: u8) -> ConnectionStatus {
    let is_tcp = record.protocol().unwrap_or(query_protocol) == IPPROTO_TCP;

    ConnectionStatus {
        status: record
            .tcp_state
            .filter(|_| is_tcp)
            .map(|code| TcpState::name_of(code).to_string()),
        origin: record.origin.as_ref().map(Tuple::from).unwrap_or_default(),
        reply: record.reply.as_ref().map(Tuple::from).unwrap_or_default(),
    }
}

/// Normalize the outcome of a lookup.
///
/// No records, or an error that only signals absence, is `Ok(None)`.
/// Other errors propagate. With several records the first one wins.
pub fn normalize_lookup(
    query: &ConntrackQuery,
    result: Result<Vec<RawEventRecord>, ConnTrackError>,
) -> Result<Option<ConnectionStatus>, ConnTrackError> {
    match result {
        Ok(records) => Ok(records
            .first()
            .map(|record| status_from_record(record, query.protocol))),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}
