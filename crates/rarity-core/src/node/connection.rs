//! Framed peer connections with per-operation timeouts.

use super::error::{NodeError, Result};
use crate::frame::{Frame, MISSING, read_frame, write_frame};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One TCP connection to another peer
///
/// Every read and write is bounded by the I/O timeout, so a silent peer
/// ends the session instead of blocking it forever.
#[derive(Debug)]
pub struct PeerStream {
    stream: TcpStream,
    peer: SocketAddr,
    io_timeout: Duration,
}

impl PeerStream {
    /// Connect to `addr`
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Timeout`] or [`NodeError::Connectivity`].
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NodeError::Timeout(format!("connect to {addr}").into()))?
            .map_err(|e| NodeError::Connectivity(format!("connect to {addr}: {e}").into()))?;

        // Control frames are tiny and latency-bound
        let _ = stream.set_nodelay(true);

        Ok(Self {
            stream,
            peer: addr,
            io_timeout,
        })
    }

    /// Wrap an accepted connection
    #[must_use]
    pub fn accepted(stream: TcpStream, peer: SocketAddr, io_timeout: Duration) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            peer,
            io_timeout,
        }
    }

    /// Remote address
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one frame
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        timeout(self.io_timeout, write_frame(&mut self.stream, frame))
            .await
            .map_err(|_| NodeError::Timeout(format!("write to {}", self.peer).into()))??;
        Ok(())
    }

    /// Send a text frame
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(&Frame::text(text)).await
    }

    /// Receive one frame, `None` on a clean close
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, a malformed frame, or EOF mid-frame.
    pub async fn try_recv(&mut self) -> Result<Option<Frame>> {
        let frame = timeout(self.io_timeout, read_frame(&mut self.stream))
            .await
            .map_err(|_| NodeError::Timeout(format!("read from {}", self.peer).into()))??;
        Ok(frame)
    }

    /// Receive one frame; a close is an error
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Connectivity`] if the peer closed the connection.
    pub async fn recv(&mut self) -> Result<Frame> {
        self.try_recv().await?.ok_or_else(|| {
            NodeError::Connectivity(format!("{} closed the connection", self.peer).into())
        })
    }

    /// Receive a text frame
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Protocol`] for any other frame kind.
    pub async fn recv_text(&mut self) -> Result<String> {
        match self.recv().await? {
            Frame::Text(text) => Ok(text),
            other => Err(NodeError::Protocol(
                format!("expected text from {}, got {:?} frame", self.peer, other.kind()).into(),
            )),
        }
    }

    /// Receive a text frame and require it to equal `expected`
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Protocol`] on any other reply.
    pub async fn expect_text(&mut self, expected: &str) -> Result<()> {
        let text = self.recv_text().await?;
        if text == expected {
            Ok(())
        } else {
            Err(NodeError::Protocol(
                format!("expected {expected:?} from {}, got {text:?}", self.peer).into(),
            ))
        }
    }

    /// Receive a data frame
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Protocol`] if the peer answered `MISSING` or sent
    /// another frame kind.
    pub async fn recv_data(&mut self) -> Result<Vec<u8>> {
        match self.recv().await? {
            Frame::Data(data) => Ok(data),
            Frame::Text(text) if text == MISSING => Err(NodeError::Protocol(
                format!("{} does not hold the requested data", self.peer).into(),
            )),
            other => Err(NodeError::Protocol(
                format!("expected data from {}, got {:?} frame", self.peer, other.kind()).into(),
            )),
        }
    }

    /// Close the write half
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Resolve a `"host:port"` peer identity
///
/// # Errors
///
/// Returns [`NodeError::Connectivity`] if the identity does not resolve.
pub async fn resolve_peer(peer: &str) -> Result<SocketAddr> {
    if let Ok(addr) = peer.parse() {
        return Ok(addr);
    }

    tokio::net::lookup_host(peer)
        .await
        .map_err(|e| NodeError::Connectivity(format!("resolve {peer}: {e}").into()))?
        .next()
        .ok_or_else(|| NodeError::Connectivity(format!("no address for {peer}").into()))
}
