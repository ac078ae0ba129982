use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use domain::conntrack::entity::RawEventRecord;
use domain::conntrack::error::ConnTrackError;
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::codec::{Decoded, NF_NETLINK_CONNTRACK_NEW, decode, messages};
use super::socket::NetlinkSocket;

/// Reads conntrack "new" events from the netfilter multicast group.
///
/// Every datagram is drained in full. Records go to a bounded mpsc
/// channel; on backpressure they are dropped and counted.
pub struct NetlinkEventReader {
    socket: NetlinkSocket,
    live: Arc<AtomicBool>,
}

impl NetlinkEventReader {
    /// Register the event subscription.
    ///
    /// `live` is set while the subscription is active and cleared when
    /// the reader stops.
    pub fn subscribe(live: Arc<AtomicBool>) -> Result<Self, ConnTrackError> {
        let socket = NetlinkSocket::open(NF_NETLINK_CONNTRACK_NEW)
            .map_err(|e| ConnTrackError::Subscription(e.to_string()))?;
        live.store(true, Ordering::Release);
        info!("conntrack event subscription registered");
        Ok(Self { socket, live })
    }

    /// Run the reader loop until cancelled, the channel closes, or the
    /// socket fails. The socket is closed on return.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<RawEventRecord>,
        metrics: Arc<dyn MetricsPort>,
        cancel_token: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                () = cancel_token.cancelled() => break,
                res = self.socket.recv() => res,
            };

            match received {
                Ok(bytes) => {
                    if !forward_batch(bytes, &tx, metrics.as_ref()) {
                        debug!("event channel closed, stopping reader");
                        break;
                    }
                }
                // The kernel dropped events because our socket buffer was full.
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("conntrack event socket overrun, events lost");
                    metrics.record_event_dropped("overflow");
                }
                Err(e) => {
                    error!(error = %e, "conntrack event socket failed");
                    break;
                }
            }
        }

        self.live.store(false, Ordering::Release);
        info!("conntrack event reader stopped");
    }
}

/// Decode one datagram and push its entries to `tx`.
///
/// Returns `false` once the receiving side is gone.
fn forward_batch(
    bytes: &[u8],
    tx: &mpsc::Sender<RawEventRecord>,
    metrics: &dyn MetricsPort,
) -> bool {
    for message in messages(bytes) {
        let decoded = message.and_then(|m| decode(&m));
        match decoded {
            Ok(Decoded::Entry(record)) => match tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("event channel full, dropping event");
                    metrics.record_event_dropped("channel_full");
                }
                Err(TrySendError::Closed(_)) => return false,
            },
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "skipping malformed conntrack message");
                metrics.record_event_dropped("malformed");
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::codec::encode_new_entry;
    use domain::conntrack::entity::{IPPROTO_TCP, RawTuple};
    use ports::test_utils::CountingMetrics;

    fn record(dst_port: u16) -> RawEventRecord {
        RawEventRecord {
            id: Some(u32::from(dst_port)),
            origin: Some(RawTuple {
                src_ip: Some("10.0.0.1".parse().unwrap()),
                dst_ip: Some("10.0.0.2".parse().unwrap()),
                protocol: Some(IPPROTO_TCP),
                src_port: Some(5000),
                dst_port: Some(dst_port),
            }),
            reply: None,
            tcp_state: Some(1),
        }
    }

    #[test]
    fn forwards_every_entry_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let metrics = CountingMetrics::default();
        let mut batch = encode_new_entry(&record(80), 1);
        batch.extend(encode_new_entry(&record(443), 2));

        assert!(forward_batch(&batch, &tx, &metrics));

        assert_eq!(rx.try_recv().unwrap(), record(80));
        assert_eq!(rx.try_recv().unwrap(), record(443));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let (tx, mut rx) = mpsc::channel(1);
        let metrics = CountingMetrics::default();
        let mut batch = encode_new_entry(&record(80), 1);
        batch.extend(encode_new_entry(&record(443), 2));

        assert!(forward_batch(&batch, &tx, &metrics));

        assert_eq!(rx.try_recv().unwrap(), record(80));
        assert_eq!(metrics.dropped("channel_full"), 1);
    }

    #[test]
    fn malformed_datagram_is_counted() {
        let (tx, mut rx) = mpsc::channel(8);
        let metrics = CountingMetrics::default();
        let batch = encode_new_entry(&record(80), 1);

        assert!(forward_batch(&batch[..12], &tx, &metrics));

        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.dropped("malformed"), 1);
    }

    #[test]
    fn closed_channel_stops_forwarding() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let metrics = CountingMetrics::default();
        let batch = encode_new_entry(&record(80), 1);

        assert!(!forward_batch(&batch, &tx, &metrics));
    }
}
