//! nfnetlink / ctnetlink wire format.
//!
//! Messages are a `nlmsghdr` (host byte order) followed by a `nfgenmsg`
//! and a stream of `nlattr` TLVs. Conntrack attribute payloads (addresses,
//! ports, ids) are in network byte order. Decoding never panics: truncated
//! headers surface as [`ConnTrackError::Protocol`], malformed attributes
//! end the attribute walk and leave the affected fields unset.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use domain::conntrack::entity::{RawEventRecord, RawTuple};
use domain::conntrack::error::ConnTrackError;
use domain::conntrack::query::ConntrackQuery;

pub const NLMSG_HDRLEN: usize = 16;
const NFGEN_HDRLEN: usize = 4;
const NLA_HDRLEN: usize = 4;
const NLA_ALIGNTO: usize = 4;

const NLA_F_NESTED: u16 = 0x8000;
const NLA_TYPE_MASK: u16 = 0x3fff;

pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;

pub const NLM_F_REQUEST: u16 = 0x1;
pub const NLM_F_ACK: u16 = 0x4;

const NFNL_SUBSYS_CTNETLINK: u16 = 1;
const IPCTNL_MSG_CT_NEW: u16 = 0;
const IPCTNL_MSG_CT_GET: u16 = 1;
const NFNETLINK_V0: u8 = 0;

/// Multicast group bitmask for conntrack "new" events.
pub const NF_NETLINK_CONNTRACK_NEW: u32 = 0x0000_0001;

const AF_INET: u8 = 2;
const AF_INET6: u8 = 10;

// enum ctattr_type
const CTA_TUPLE_ORIG: u16 = 1;
const CTA_TUPLE_REPLY: u16 = 2;
const CTA_PROTOINFO: u16 = 4;
const CTA_ID: u16 = 12;

// enum ctattr_tuple
const CTA_TUPLE_IP: u16 = 1;
const CTA_TUPLE_PROTO: u16 = 2;

// enum ctattr_ip
const CTA_IP_V4_SRC: u16 = 1;
const CTA_IP_V4_DST: u16 = 2;
const CTA_IP_V6_SRC: u16 = 3;
const CTA_IP_V6_DST: u16 = 4;

// enum ctattr_l4proto
const CTA_PROTO_NUM: u16 = 1;
const CTA_PROTO_SRC_PORT: u16 = 2;
const CTA_PROTO_DST_PORT: u16 = 3;

// enum ctattr_protoinfo / ctattr_protoinfo_tcp
const CTA_PROTOINFO_TCP: u16 = 1;
const CTA_PROTOINFO_TCP_STATE: u16 = 1;

const fn align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

const fn ctnetlink_type(msg: u16) -> u16 {
    (NFNL_SUBSYS_CTNETLINK << 8) | msg
}

fn ne_u16(b: &[u8]) -> Option<u16> {
    Some(u16::from_ne_bytes(b.get(..2)?.try_into().ok()?))
}

fn ne_u32(b: &[u8]) -> Option<u32> {
    Some(u32::from_ne_bytes(b.get(..4)?.try_into().ok()?))
}

fn be_u16(b: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(b.get(..2)?.try_into().ok()?))
}

fn be_u32(b: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(b.get(..4)?.try_into().ok()?))
}

// ── Netlink messages ───────────────────────────────────────────────

/// One netlink message borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub port_id: u32,
    pub payload: &'a [u8],
}

/// Iterator over the messages packed in one datagram.
///
/// A malformed header yields one error and ends the iteration, since
/// the following message boundaries can no longer be trusted.
pub struct Messages<'a> {
    buf: &'a [u8],
}

pub fn messages(buf: &[u8]) -> Messages<'_> {
    Messages { buf }
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<Message<'a>, ConnTrackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let buf = std::mem::take(&mut self.buf);

        let Some(len) = ne_u32(buf).and_then(|l| usize::try_from(l).ok()) else {
            return Some(Err(ConnTrackError::Protocol(format!(
                "truncated netlink header ({} bytes)",
                buf.len()
            ))));
        };
        if len < NLMSG_HDRLEN || len > buf.len() {
            return Some(Err(ConnTrackError::Protocol(format!(
                "bad netlink message length {len} (buffer {})",
                buf.len()
            ))));
        }

        let message = Message {
            msg_type: ne_u16(&buf[4..]).unwrap_or_default(),
            flags: ne_u16(&buf[6..]).unwrap_or_default(),
            seq: ne_u32(&buf[8..]).unwrap_or_default(),
            port_id: ne_u32(&buf[12..]).unwrap_or_default(),
            payload: &buf[NLMSG_HDRLEN..len],
        };
        self.buf = &buf[align(len).min(buf.len())..];
        Some(Ok(message))
    }
}

/// Meaning of a single message for the conntrack subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A conntrack entry, from an event or a lookup reply.
    Entry(RawEventRecord),
    /// `NLMSG_ERROR` with code 0.
    Ack,
    /// `NLMSG_ERROR` carrying a positive errno.
    Error(i32),
    Done,
    /// Anything else (other subsystems, other ctnetlink message types).
    Other(u16),
}

pub fn decode(message: &Message<'_>) -> Result<Decoded, ConnTrackError> {
    match message.msg_type {
        NLMSG_ERROR => {
            let code = ne_u32(message.payload)
                .map(|raw| i32::from_ne_bytes(raw.to_ne_bytes()))
                .ok_or_else(|| ConnTrackError::Protocol("truncated NLMSG_ERROR".to_string()))?;
            if code == 0 {
                Ok(Decoded::Ack)
            } else {
                Ok(Decoded::Error(code.saturating_neg()))
            }
        }
        NLMSG_DONE => Ok(Decoded::Done),
        t if t == ctnetlink_type(IPCTNL_MSG_CT_NEW) => {
            let attrs = message.payload.get(NFGEN_HDRLEN..).ok_or_else(|| {
                ConnTrackError::Protocol("ctnetlink message without nfgenmsg".to_string())
            })?;
            Ok(Decoded::Entry(decode_record(attrs)))
        }
        other => Ok(Decoded::Other(other)),
    }
}

/// Map a netlink errno to the conntrack error taxonomy.
pub fn errno_error(errno: i32) -> ConnTrackError {
    match errno {
        libc::ENOENT => ConnTrackError::NoSuchEntry,
        libc::EAFNOSUPPORT | libc::EPROTONOSUPPORT | libc::EOPNOTSUPP => {
            ConnTrackError::TableUnavailable { errno }
        }
        _ => ConnTrackError::Transport(std::io::Error::from_raw_os_error(errno).to_string()),
    }
}

/// Map a socket error, keeping errno-based absence signals.
pub fn io_error(err: &std::io::Error) -> ConnTrackError {
    match err.raw_os_error() {
        Some(errno) => errno_error(errno),
        None => ConnTrackError::Transport(err.to_string()),
    }
}

// ── Attributes ─────────────────────────────────────────────────────

struct Attrs<'a> {
    buf: &'a [u8],
}

fn attrs(buf: &[u8]) -> Attrs<'_> {
    Attrs { buf }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let buf = std::mem::take(&mut self.buf);
        let len = usize::from(ne_u16(buf)?);
        let kind = ne_u16(buf.get(2..)?)? & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || len > buf.len() {
            return None;
        }
        self.buf = &buf[align(len).min(buf.len())..];
        Some((kind, &buf[NLA_HDRLEN..len]))
    }
}

/// Decode the attribute stream of a ctnetlink entry.
pub fn decode_record(buf: &[u8]) -> RawEventRecord {
    let mut record = RawEventRecord::default();
    for (kind, value) in attrs(buf) {
        match kind {
            CTA_TUPLE_ORIG => record.origin = Some(decode_tuple(value)),
            CTA_TUPLE_REPLY => record.reply = Some(decode_tuple(value)),
            CTA_PROTOINFO => record.tcp_state = decode_tcp_state(value).or(record.tcp_state),
            CTA_ID => record.id = be_u32(value),
            _ => {}
        }
    }
    record
}

fn decode_tuple(buf: &[u8]) -> RawTuple {
    let mut tuple = RawTuple::default();
    for (kind, value) in attrs(buf) {
        match kind {
            CTA_TUPLE_IP => {
                for (ip_kind, addr) in attrs(value) {
                    match ip_kind {
                        CTA_IP_V4_SRC => tuple.src_ip = ipv4(addr).or(tuple.src_ip),
                        CTA_IP_V4_DST => tuple.dst_ip = ipv4(addr).or(tuple.dst_ip),
                        CTA_IP_V6_SRC => tuple.src_ip = ipv6(addr).or(tuple.src_ip),
                        CTA_IP_V6_DST => tuple.dst_ip = ipv6(addr).or(tuple.dst_ip),
                        _ => {}
                    }
                }
            }
            CTA_TUPLE_PROTO => {
                for (proto_kind, v) in attrs(value) {
                    match proto_kind {
                        CTA_PROTO_NUM => tuple.protocol = v.first().copied(),
                        CTA_PROTO_SRC_PORT => tuple.src_port = be_u16(v),
                        CTA_PROTO_DST_PORT => tuple.dst_port = be_u16(v),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    tuple
}

fn decode_tcp_state(buf: &[u8]) -> Option<u8> {
    let (_, tcp) = attrs(buf).find(|(kind, _)| *kind == CTA_PROTOINFO_TCP)?;
    let (_, state) = attrs(tcp).find(|(kind, _)| *kind == CTA_PROTOINFO_TCP_STATE)?;
    state.first().copied()
}

fn ipv4(b: &[u8]) -> Option<IpAddr> {
    let octets: [u8; 4] = b.get(..4)?.try_into().ok()?;
    Some(IpAddr::V4(Ipv4Addr::from(octets)))
}

fn ipv6(b: &[u8]) -> Option<IpAddr> {
    let octets: [u8; 16] = b.get(..16)?.try_into().ok()?;
    Some(IpAddr::V6(Ipv6Addr::from(octets)))
}

// ── Encoding ───────────────────────────────────────────────────────

struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    fn new(msg_type: u16, flags: u16, seq: u32, family: u8) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&msg_type.to_ne_bytes());
        buf.extend_from_slice(&flags.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        // nfgenmsg: family, version, res_id (big endian)
        buf.extend_from_slice(&[family, NFNETLINK_V0, 0, 0]);
        Self { buf }
    }

    fn attr(&mut self, kind: u16, value: &[u8]) {
        let len = NLA_HDRLEN + value.len();
        self.buf
            .extend_from_slice(&u16::try_from(len).unwrap_or(u16::MAX).to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(value);
        self.pad();
    }

    fn begin_nested(&mut self, kind: u16) -> usize {
        let start = self.buf.len();
        self.buf.extend_from_slice(&0u16.to_ne_bytes());
        self.buf.extend_from_slice(&(kind | NLA_F_NESTED).to_ne_bytes());
        start
    }

    fn end_nested(&mut self, start: usize) {
        let len = u16::try_from(self.buf.len() - start).unwrap_or(u16::MAX);
        self.buf[start..start + 2].copy_from_slice(&len.to_ne_bytes());
    }

    fn pad(&mut self) {
        let padded = align(self.buf.len());
        self.buf.resize(padded, 0);
    }

    fn tuple(&mut self, kind: u16, tuple: &RawTuple) {
        let outer = self.begin_nested(kind);

        let ip = self.begin_nested(CTA_TUPLE_IP);
        match tuple.src_ip {
            Some(IpAddr::V4(a)) => self.attr(CTA_IP_V4_SRC, &a.octets()),
            Some(IpAddr::V6(a)) => self.attr(CTA_IP_V6_SRC, &a.octets()),
            None => {}
        }
        match tuple.dst_ip {
            Some(IpAddr::V4(a)) => self.attr(CTA_IP_V4_DST, &a.octets()),
            Some(IpAddr::V6(a)) => self.attr(CTA_IP_V6_DST, &a.octets()),
            None => {}
        }
        self.end_nested(ip);

        let proto = self.begin_nested(CTA_TUPLE_PROTO);
        if let Some(num) = tuple.protocol {
            self.attr(CTA_PROTO_NUM, &[num]);
        }
        if let Some(port) = tuple.src_port {
            self.attr(CTA_PROTO_SRC_PORT, &port.to_be_bytes());
        }
        if let Some(port) = tuple.dst_port {
            self.attr(CTA_PROTO_DST_PORT, &port.to_be_bytes());
        }
        self.end_nested(proto);

        self.end_nested(outer);
    }

    fn finish(mut self) -> Vec<u8> {
        let len = u32::try_from(self.buf.len()).unwrap_or(u32::MAX);
        self.buf[..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// Build an `IPCTNL_MSG_CT_GET` request for the entry whose reply tuple
/// matches `query`.
pub fn encode_get_request(query: &ConntrackQuery, seq: u32) -> Vec<u8> {
    let family = if query.is_ipv6() { AF_INET6 } else { AF_INET };
    let mut writer = MessageWriter::new(
        ctnetlink_type(IPCTNL_MSG_CT_GET),
        NLM_F_REQUEST | NLM_F_ACK,
        seq,
        family,
    );
    writer.tuple(
        CTA_TUPLE_REPLY,
        &RawTuple {
            src_ip: Some(query.src_ip),
            dst_ip: Some(query.dst_ip),
            protocol: Some(query.protocol),
            src_port: Some(query.src_port),
            dst_port: Some(query.dst_port),
        },
    );
    writer.finish()
}

/// Build a conntrack "new" message as the kernel would send it.
#[cfg(test)]
pub(crate) fn encode_new_entry(record: &RawEventRecord, seq: u32) -> Vec<u8> {
    let v6 = record
        .origin
        .as_ref()
        .and_then(|t| t.src_ip)
        .is_some_and(|ip| ip.is_ipv6());
    let mut writer = MessageWriter::new(
        ctnetlink_type(IPCTNL_MSG_CT_NEW),
        0,
        seq,
        if v6 { AF_INET6 } else { AF_INET },
    );
    if let Some(origin) = &record.origin {
        writer.tuple(CTA_TUPLE_ORIG, origin);
    }
    if let Some(reply) = &record.reply {
        writer.tuple(CTA_TUPLE_REPLY, reply);
    }
    if let Some(state) = record.tcp_state {
        let info = writer.begin_nested(CTA_PROTOINFO);
        let tcp = writer.begin_nested(CTA_PROTOINFO_TCP);
        writer.attr(CTA_PROTOINFO_TCP_STATE, &[state]);
        writer.end_nested(tcp);
        writer.end_nested(info);
    }
    if let Some(id) = record.id {
        writer.attr(CTA_ID, &id.to_be_bytes());
    }
    writer.finish()
}

/// Build an `NLMSG_ERROR` message; `errno` 0 is an ack.
#[cfg(test)]
pub(crate) fn encode_error(errno: i32, seq: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NLMSG_HDRLEN * 2 + 4);
    let len = u32::try_from(NLMSG_HDRLEN * 2 + 4).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&NLMSG_ERROR.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&seq.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes());
    buf.extend_from_slice(&(-errno).to_ne_bytes());
    buf.extend_from_slice(&[0u8; NLMSG_HDRLEN]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::conntrack::entity::{IPPROTO_TCP, QueryParams, QueryProtocol};

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    fn sample_record() -> RawEventRecord {
        RawEventRecord {
            id: Some(0x0102_0304),
            origin: Some(RawTuple {
                src_ip: ip("198.51.100.7"),
                dst_ip: ip("192.0.2.10"),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(51000),
                dst_port: Some(443),
            }),
            reply: Some(RawTuple {
                src_ip: ip("192.0.2.10"),
                dst_ip: ip("203.0.113.9"),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(443),
                dst_port: Some(8443),
            }),
            tcp_state: Some(1),
        }
    }

    fn single(buf: &[u8]) -> Decoded {
        let mut iter = messages(buf);
        let msg = iter.next().unwrap().unwrap();
        assert!(iter.next().is_none());
        decode(&msg).unwrap()
    }

    #[test]
    fn decodes_new_entry() {
        let bytes = encode_new_entry(&sample_record(), 0);
        assert_eq!(single(&bytes), Decoded::Entry(sample_record()));
    }

    #[test]
    fn decodes_ipv6_entry() {
        let record = RawEventRecord {
            origin: Some(RawTuple {
                src_ip: ip("2001:db8::1"),
                dst_ip: ip("2001:db8::2"),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(40000),
                dst_port: Some(80),
            }),
            ..RawEventRecord::default()
        };
        let bytes = encode_new_entry(&record, 0);
        assert_eq!(bytes[NLMSG_HDRLEN], AF_INET6);
        assert_eq!(single(&bytes), Decoded::Entry(record));
    }

    #[test]
    fn ports_are_network_order_on_the_wire() {
        let bytes = encode_new_entry(&sample_record(), 0);
        let port = 51000u16.to_be_bytes();
        assert!(bytes.windows(2).any(|w| w == port));
    }

    #[test]
    fn multiple_messages_in_one_datagram() {
        let mut buf = encode_new_entry(&sample_record(), 1);
        buf.extend(encode_new_entry(&RawEventRecord::default(), 2));
        let seqs: Vec<u32> = messages(&buf).map(|m| m.unwrap().seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn truncated_header_is_protocol_error() {
        let bytes = encode_new_entry(&sample_record(), 0);
        let mut iter = messages(&bytes[..10]);
        assert!(matches!(
            iter.next(),
            Some(Err(ConnTrackError::Protocol(_)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn length_beyond_buffer_is_protocol_error() {
        let bytes = encode_new_entry(&sample_record(), 0);
        let cut = &bytes[..bytes.len() - 8];
        assert!(matches!(
            messages(cut).next(),
            Some(Err(ConnTrackError::Protocol(_)))
        ));
    }

    #[test]
    fn truncated_attributes_decode_partially() {
        let bytes = encode_new_entry(&sample_record(), 0);
        let payload = &bytes[NLMSG_HDRLEN + NFGEN_HDRLEN..];
        // Every prefix of the attribute stream decodes without panicking.
        for cut in 0..payload.len() {
            let _ = decode_record(&payload[..cut]);
        }
        let origin_len = align(usize::from(ne_u16(payload).unwrap()));
        let partial = decode_record(&payload[..origin_len + 6]);
        assert_eq!(partial.origin, sample_record().origin);
        assert!(partial.reply.is_none());
        assert!(partial.tcp_state.is_none());
    }

    #[test]
    fn garbage_never_panics() {
        let mut state = 0x1234_5678u32;
        for len in 0..256 {
            let buf: Vec<u8> = (0..len)
                .map(|_| {
                    state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    state.to_be_bytes()[0]
                })
                .collect();
            for msg in messages(&buf).flatten() {
                let _ = decode(&msg);
            }
            let _ = decode_record(&buf);
        }
    }

    #[test]
    fn decodes_ack_and_errors() {
        assert_eq!(single(&encode_error(0, 7)), Decoded::Ack);
        assert_eq!(
            single(&encode_error(libc::ENOENT, 7)),
            Decoded::Error(libc::ENOENT)
        );
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(errno_error(libc::ENOENT), ConnTrackError::NoSuchEntry);
        assert!(errno_error(libc::EAFNOSUPPORT).is_absence());
        assert!(errno_error(libc::EPROTONOSUPPORT).is_absence());
        assert!(errno_error(libc::EOPNOTSUPP).is_absence());
        assert!(matches!(
            errno_error(libc::EPERM),
            ConnTrackError::Transport(_)
        ));
        assert!(!errno_error(libc::EBADF).is_absence());
    }

    #[test]
    fn io_error_without_errno_is_transport() {
        let err = io_error(&std::io::Error::other("closed"));
        assert!(matches!(err, ConnTrackError::Transport(_)));
        let err = io_error(&std::io::Error::from_raw_os_error(libc::ENOENT));
        assert_eq!(err, ConnTrackError::NoSuchEntry);
    }

    #[test]
    fn get_request_layout() {
        let query = ConntrackQuery::from_params(&QueryParams {
            protocol: QueryProtocol::Udp,
            src_ip: "203.0.113.9".to_string(),
            dst_ip: "198.51.100.7".to_string(),
            src_port: 53,
            dst_port: 40000,
        });
        let bytes = encode_get_request(&query, 42);

        let msg = messages(&bytes).next().unwrap().unwrap();
        assert_eq!(msg.msg_type, (1 << 8) | 1);
        assert_eq!(msg.flags, NLM_F_REQUEST | NLM_F_ACK);
        assert_eq!(msg.seq, 42);
        assert_eq!(usize::try_from(ne_u32(&bytes).unwrap()).unwrap(), bytes.len());
        assert_eq!(msg.payload[0], AF_INET);
        assert_eq!(bytes.len() % 4, 0);

        let record = decode_record(&msg.payload[NFGEN_HDRLEN..]);
        assert!(record.origin.is_none());
        let reply = record.reply.unwrap();
        assert_eq!(reply.src_ip, ip("203.0.113.9"));
        assert_eq!(reply.dst_ip, ip("198.51.100.7"));
        assert_eq!(reply.protocol, Some(17));
        assert_eq!(reply.src_port, Some(53));
        assert_eq!(reply.dst_port, Some(40000));
    }

    #[test]
    fn get_request_ipv6_family() {
        let query = ConntrackQuery::from_params(&QueryParams {
            protocol: QueryProtocol::Tcp,
            src_ip: "2001:db8::1".to_string(),
            dst_ip: "2001:db8::2".to_string(),
            src_port: 443,
            dst_port: 50000,
        });
        let bytes = encode_get_request(&query, 1);
        assert_eq!(bytes[NLMSG_HDRLEN], AF_INET6);
        let msg = messages(&bytes).next().unwrap().unwrap();
        let reply = decode_record(&msg.payload[NFGEN_HDRLEN..]).reply.unwrap();
        assert_eq!(reply.src_ip, ip("2001:db8::1"));
    }

    #[test]
    fn get_request_is_not_an_entry() {
        let query = ConntrackQuery::from_params(&QueryParams::default());
        let bytes = encode_get_request(&query, 1);
        assert_eq!(single(&bytes), Decoded::Other((1 << 8) | 1));
    }
}
