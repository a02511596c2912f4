//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] instead of raw bytes: one packet per datagram,
//! using the fixed [`WIRE_LEN`]-byte image.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, WIRE_LEN};

/// Receive buffer size.  Anything longer than a packet is rejected by
/// [`Packet::decode`], so a little slack is enough to detect oversize
/// datagrams without truncating them to a valid length.
const RECV_BUF: usize = WIRE_LEN + 64;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The received datagram could not be decoded as a packet.
    #[error("packet decode error: {0}")]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// One SR endpoint's UDP socket: each datagram carries exactly one packet.
///
/// The link loops borrow it immutably, so a receive can stay pending in
/// `select!` while ACKs or retransmissions go out on the same socket.
#[derive(Debug)]
pub struct Socket {
    /// Resolved local address; peers reply here, so a port-0 bind reports the
    /// port actually assigned.
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind an endpoint to `local_addr`.  Senders usually bind port 0;
    /// receivers bind the address their peer was given.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(&packet.encode(), dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Packet`].
    ///
    /// Returns `(packet, sender_address)`.  Datagrams that fail to decode are
    /// returned as [`SocketError::Packet`]; the caller decides whether to
    /// keep reading.  Cancel-safe.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = [0u8; RECV_BUF];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet, addr))
    }
}
