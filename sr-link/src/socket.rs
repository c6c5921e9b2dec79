//! Async UDP frame transport.
//!
//! [`FrameSocket`] is a thin wrapper around `tokio::net::UdpSocket`
//! connected to exactly one peer.  It moves raw frame bytes only: decoding
//! stays in [`crate::link::Link`], because a frame that fails to decode must
//! still reach the link so it can request a retransmission.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

/// Largest datagram accepted from the peer.
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SocketError {
    /// `true` for the ICMP port-unreachable report a connected UDP socket
    /// surfaces when the peer is not listening.  The frame is simply lost.
    pub fn is_peer_unreachable(&self) -> bool {
        match self {
            SocketError::Io(e) => e.kind() == std::io::ErrorKind::ConnectionRefused,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSocket
// ---------------------------------------------------------------------------

/// A UDP socket carrying link frames to and from one peer.
#[derive(Debug)]
pub struct FrameSocket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    /// The only address frames are exchanged with.
    pub peer: SocketAddr,
    inner: UdpSocket,
}

impl FrameSocket {
    /// Bind to `local_addr` and connect to `peer`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, peer: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        inner.connect(peer).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer,
            inner,
        })
    }

    /// Bind to `local_addr` without a peer yet; call [`connect`](Self::connect)
    /// once the peer's address is known.
    pub async fn bind_unconnected(local_addr: SocketAddr) -> Result<UnconnectedSocket, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(UnconnectedSocket { local_addr, inner })
    }

    /// Send one frame as a single datagram.
    pub async fn send(&self, frame: &[u8]) -> Result<(), SocketError> {
        self.inner.send(frame).await?;
        Ok(())
    }

    /// Receive the next datagram from the peer.
    pub async fn recv(&self) -> Result<Vec<u8>, SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.inner.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// A bound socket waiting for its peer address.
///
/// Lets two stations on ephemeral ports learn each other's address before
/// either connects.
#[derive(Debug)]
pub struct UnconnectedSocket {
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl UnconnectedSocket {
    pub async fn connect(self, peer: SocketAddr) -> Result<FrameSocket, SocketError> {
        self.inner.connect(peer).await?;
        Ok(FrameSocket {
            local_addr: self.local_addr,
            peer,
            inner: self.inner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_loopback_unchanged() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let a = FrameSocket::bind_unconnected(loopback).await.unwrap();
        let b = FrameSocket::bind_unconnected(loopback).await.unwrap();
        let (a_addr, b_addr) = (a.local_addr, b.local_addr);
        let a = a.connect(b_addr).await.unwrap();
        let b = b.connect(a_addr).await.unwrap();

        a.send(&[0x81, 1, 2, 3, 4]).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), vec![0x81, 1, 2, 3, 4]);
        assert_eq!(b.peer, a_addr);
    }
}
