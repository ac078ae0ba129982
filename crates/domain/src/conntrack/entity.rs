use std::net::IpAddr;

use serde::Serialize;

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const IPPROTO_UDP: u8 = 17;

// ── Raw kernel view ────────────────────────────────────────────────

/// One direction of a conntrack entry as decoded from the kernel.
///
/// Every field is optional: entries caught during connection setup
/// frequently carry only part of their attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTuple {
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub protocol: Option<u8>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// A conntrack record delivered by an event subscription or a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEventRecord {
    /// Kernel conntrack id, when the message carries one.
    pub id: Option<u32>,
    pub origin: Option<RawTuple>,
    /// Reply direction, populated with the post-NAT addressing.
    pub reply: Option<RawTuple>,
    /// TCP state code (`CTA_PROTOINFO_TCP_STATE`).
    pub tcp_state: Option<u8>,
}

impl RawEventRecord {
    /// Protocol number of the origin direction.
    pub fn protocol(&self) -> Option<u8> {
        self.origin.as_ref().and_then(|t| t.protocol)
    }
}

// ── Normalized view ────────────────────────────────────────────────

/// Normalized tuple: string addresses and numeric ports, zero-valued
/// when the raw field was missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tuple {
    #[serde(rename = "src")]
    pub src_ip: String,
    #[serde(rename = "dst")]
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
}

impl From<&RawTuple> for Tuple {
    fn from(raw: &RawTuple) -> Self {
        Self {
            src_ip: ip_string(raw.src_ip),
            dst_ip: ip_string(raw.dst_ip),
            src_port: raw.src_port.unwrap_or(0),
            dst_port: raw.dst_port.unwrap_or(0),
        }
    }
}

pub(crate) fn ip_string(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string()).unwrap_or_default()
}

/// A new TCP connection to one of the watched ports.
///
/// `nat_ip`/`nat_port` come from the reply tuple's destination, i.e. the
/// address the traffic was translated to. They are empty/zero when the
/// record had no reply direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionObservation {
    pub dst_port: u16,
    pub origin: Tuple,
    pub nat_ip: String,
    pub nat_port: u16,
}

// ── Query model ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryProtocol {
    #[default]
    Tcp,
    Udp,
}

impl QueryProtocol {
    /// Parse a client-supplied protocol name. Anything other than
    /// `udp` (including the empty string) is TCP.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("udp") {
            Self::Udp
        } else {
            Self::Tcp
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::Tcp => IPPROTO_TCP,
            Self::Udp => IPPROTO_UDP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl std::fmt::Display for QueryProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-supplied lookup criteria, expressed in reply-direction terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub protocol: QueryProtocol,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub origin: Tuple,
    pub reply: Tuple,
}

// ── TCP state ──────────────────────────────────────────────────────

/// Kernel conntrack TCP states (`enum tcp_conntrack`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    None,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
    Close,
    SynSent2,
    Max,
}

/// Name reported for state codes outside the kernel's table.
pub const TCP_STATE_UNKNOWN: &str = "UNKNOWN";

impl TcpState {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::SynSent,
            2 => Self::SynRecv,
            3 => Self::Established,
            4 => Self::FinWait,
            5 => Self::CloseWait,
            6 => Self::LastAck,
            7 => Self::TimeWait,
            8 => Self::Close,
            9 => Self::SynSent2,
            10 => Self::Max,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::SynSent2 => "SYN_SENT2",
            Self::Max => "MAX",
        }
    }

    /// Human-readable name for any code; unknown codes map to `UNKNOWN`.
    pub fn name_of(code: u8) -> &'static str {
        Self::from_code(code).map_or(TCP_STATE_UNKNOWN, Self::as_str)
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
