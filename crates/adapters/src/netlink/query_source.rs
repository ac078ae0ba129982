use std::sync::atomic::{AtomicU32, Ordering};

use domain::conntrack::entity::RawEventRecord;
use domain::conntrack::error::ConnTrackError;
use domain::conntrack::query::ConntrackQuery;
use ports::secondary::conntrack_query_port::{
    ConntrackQueryPort, ConntrackQuerySession, LookupFuture,
};

use super::codec::{Decoded, decode, encode_get_request, errno_error, io_error, messages};
use super::socket::NetlinkSocket;

/// Conntrack query source backed by ctnetlink.
///
/// Hands out one fresh socket per session, so concurrent lookups never
/// share state.
pub struct NetlinkQuerySource {
    next_seq: AtomicU32,
}

impl NetlinkQuerySource {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU32::new(1),
        }
    }
}

impl Default for NetlinkQuerySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConntrackQueryPort for NetlinkQuerySource {
    fn open_session(&self) -> Result<Box<dyn ConntrackQuerySession>, ConnTrackError> {
        let socket = NetlinkSocket::open(0)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NetlinkQuerySession { socket, seq }))
    }
}

struct NetlinkQuerySession {
    socket: NetlinkSocket,
    seq: u32,
}

impl ConntrackQuerySession for NetlinkQuerySession {
    fn lookup<'a>(&'a mut self, query: &'a ConntrackQuery) -> LookupFuture<'a> {
        Box::pin(async move {
            let request = encode_get_request(query, self.seq);
            self.socket.send(&request).map_err(|e| io_error(&e))?;

            let mut reply = LookupReply::new(self.seq);
            loop {
                let bytes = self.socket.recv().await.map_err(|e| io_error(&e))?;
                if let Some(result) = reply.feed(bytes) {
                    return result;
                }
            }
        })
    }
}

/// Accumulates the answer to one `CT_GET` request.
///
/// Messages for other sequence numbers are ignored. The answer is
/// complete on the first ack, error or done message.
struct LookupReply {
    seq: u32,
    records: Vec<RawEventRecord>,
}

impl LookupReply {
    fn new(seq: u32) -> Self {
        Self {
            seq,
            records: Vec::new(),
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Option<Result<Vec<RawEventRecord>, ConnTrackError>> {
        for message in messages(bytes) {
            let message = match message {
                Ok(m) => m,
                Err(e) => return Some(Err(e)),
            };
            if message.seq != self.seq {
                continue;
            }
            match decode(&message) {
                Ok(Decoded::Entry(record)) => self.records.push(record),
                Ok(Decoded::Ack | Decoded::Done) => {
                    return Some(Ok(std::mem::take(&mut self.records)));
                }
                Ok(Decoded::Error(errno)) => return Some(Err(errno_error(errno))),
                Ok(Decoded::Other(_)) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::codec::{encode_error, encode_new_entry};
    use domain::conntrack::entity::{IPPROTO_TCP, RawTuple};

    fn entry() -> RawEventRecord {
        RawEventRecord {
            id: Some(5),
            origin: Some(RawTuple {
                src_ip: Some("198.51.100.7".parse().unwrap()),
                dst_ip: Some("192.0.2.10".parse().unwrap()),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(51000),
                dst_port: Some(443),
            }),
            reply: Some(RawTuple {
                src_ip: Some("10.1.1.5".parse().unwrap()),
                dst_ip: Some("198.51.100.7".parse().unwrap()),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(8443),
                dst_port: Some(51000),
            }),
            tcp_state: Some(3),
        }
    }

    #[test]
    fn entry_then_ack() {
        let mut reply = LookupReply::new(9);
        assert!(reply.feed(&encode_new_entry(&entry(), 9)).is_none());
        let records = reply.feed(&encode_error(0, 9)).unwrap().unwrap();
        assert_eq!(records, vec![entry()]);
    }

    #[test]
    fn entry_and_ack_in_one_datagram() {
        let mut reply = LookupReply::new(9);
        let mut batch = encode_new_entry(&entry(), 9);
        batch.extend(encode_error(0, 9));
        let records = reply.feed(&batch).unwrap().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn enoent_is_no_such_entry() {
        let mut reply = LookupReply::new(3);
        let result = reply.feed(&encode_error(libc::ENOENT, 3)).unwrap();
        assert_eq!(result, Err(ConnTrackError::NoSuchEntry));
    }

    #[test]
    fn other_errno_is_transport_error() {
        let mut reply = LookupReply::new(3);
        let result = reply.feed(&encode_error(libc::EPERM, 3)).unwrap();
        assert!(matches!(result, Err(ConnTrackError::Transport(_))));
    }

    #[test]
    fn foreign_sequence_numbers_are_ignored() {
        let mut reply = LookupReply::new(4);
        let mut batch = encode_new_entry(&entry(), 99);
        batch.extend(encode_error(libc::ENOENT, 99));
        assert!(reply.feed(&batch).is_none());
        let records = reply.feed(&encode_error(0, 4)).unwrap().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_reply_is_protocol_error() {
        let mut reply = LookupReply::new(1);
        let bytes = encode_new_entry(&entry(), 1);
        let result = reply.feed(&bytes[..8]).unwrap();
        assert!(matches!(result, Err(ConnTrackError::Protocol(_))));
    }
}
