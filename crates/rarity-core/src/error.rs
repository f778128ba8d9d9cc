//! Wire-level error types.

use thiserror::Error;

/// Frame encoding/decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Buffer too short to hold the frame it announces
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Unknown frame kind byte
    #[error("unknown frame kind: 0x{0:02X}")]
    UnknownKind(u8),

    /// Frame exceeds the maximum length
    #[error("frame of {0} bytes exceeds maximum")]
    TooLarge(usize),

    /// Inner length field disagrees with the frame length
    #[error("payload length {declared} does not match frame body {actual}")]
    LengthMismatch {
        /// Length declared inside the body
        declared: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Text frame is not valid UTF-8
    #[error("text frame is not valid UTF-8")]
    InvalidUtf8,

    /// Peer closed the connection mid-frame or before an expected frame
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Returns true if the peer went away rather than misbehaving
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::ConnectionClosed => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
