//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that owns the
//! receive buffer sizing and the one-byte acknowledgment convenience.  All
//! protocol logic lives elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::protocol::{ACK, MAX_PAYLOAD};

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `payload` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(payload, dest).await?;
        Ok(())
    }

    /// Send the one-byte acknowledgment to `dest`.
    pub async fn send_ack(&self, dest: SocketAddr) -> io::Result<()> {
        self.send_to(&[ACK], dest).await
    }

    /// Receive the next datagram.
    ///
    /// Returns `(payload, sender_address)`.  Payloads longer than
    /// [`MAX_PAYLOAD`] are truncated by the OS; the protocol never sends
    /// them.
    pub async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_PAYLOAD];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
