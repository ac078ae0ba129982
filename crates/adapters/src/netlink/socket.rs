#![allow(unsafe_code)] // Required to register the netlink fd with the tokio reactor

use std::io;

use netlink_sys::protocols::NETLINK_NETFILTER;
use netlink_sys::{Socket, SocketAddr};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

/// Receive buffer size; large enough for a batch of conntrack messages.
const RECV_BUF_SIZE: usize = 64 * 1024;

/// Non-blocking `NETLINK_NETFILTER` socket driven by the tokio reactor.
///
/// The socket is closed when this value is dropped.
pub struct NetlinkSocket {
    fd: AsyncFd<Socket>,
    buf: Vec<u8>,
}

impl NetlinkSocket {
    /// Open and bind a socket. `groups` is the multicast group bitmask,
    /// 0 for a plain request/response socket.
    pub fn open(groups: u32) -> io::Result<Self> {
        let mut socket = Socket::new(NETLINK_NETFILTER)?;
        socket.bind(&SocketAddr::new(0, groups))?;
        socket.set_non_blocking(true)?;
        // SAFETY: `Socket` owns its fd, keeps it open until dropped and
        // always returns the same fd from `as_raw_fd`.
        let fd = unsafe { AsyncFd::register_with_interest(socket, Interest::READABLE)? };
        Ok(Self {
            fd,
            buf: Vec::with_capacity(RECV_BUF_SIZE),
        })
    }

    /// Send one request to the kernel.
    pub fn send(&self, msg: &[u8]) -> io::Result<()> {
        let kernel = SocketAddr::new(0, 0);
        self.fd.get_ref().send_to(msg, &kernel, 0)?;
        Ok(())
    }

    /// Receive one datagram. Cancel safe.
    pub async fn recv(&mut self) -> io::Result<&[u8]> {
        loop {
            let mut guard = self.fd.readable().await?;
            self.buf.clear();
            let buf = &mut self.buf;
            match guard.try_io(|inner| inner.get_ref().recv(buf, 0)) {
                Ok(Ok(n)) => {
                    let n = n.min(self.buf.len());
                    return Ok(&self.buf[..n]);
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
    }
}
