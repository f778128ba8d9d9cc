//! Error types for the Node API
//!
//! Errors are grouped the way the transfer engine reacts to them:
//!
//! - **Protocol**: malformed or out-of-sequence frame, unexpected reply.
//!   The session is aborted; chunks already stored are kept.
//! - **Integrity**: whole-file digest mismatch. Triggers bounded recovery
//!   before it is reported.
//! - **Coordinator**: the tracker rejected an operation.
//! - **Connectivity**: refused, reset or timed-out connection. Counted as a
//!   failed connection; other sessions are unaffected.
//!
//! # Example
//!
//! ```no_run
//! use rarity_core::node::NodeError;
//!
//! fn handle_error(err: NodeError) {
//!     if err.is_transient() {
//!         println!("Transient error, may retry: {}", err);
//!     } else {
//!         println!("Permanent error: {}", err);
//!     }
//! }
//! ```

use crate::error::FrameError;
use rarity_files::FilesError;
use rarity_tracker::TrackerError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in Node operations
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    // ============ Session Errors ============
    /// Malformed frame or unexpected reply
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// Could not reach or stay connected to a peer
    #[error("Connection failed: {0}")]
    Connectivity(Cow<'static, str>),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    // ============ Integrity Errors ============
    /// Whole-file digest mismatch after reassembly
    #[error("Hash mismatch: integrity verification failed")]
    HashMismatch,

    /// Recovery gave up with chunks still corrupted
    #[error("Integrity failure for {file_id}: chunks {corrupted:?} still corrupted")]
    Integrity {
        /// Affected file
        file_id: String,
        /// Chunks that never verified
        corrupted: Vec<u32>,
    },

    // ============ Coordinator Errors ============
    /// Tracker rejected or could not serve a request
    #[error("Coordinator error: {0}")]
    Coordinator(Cow<'static, str>),

    // ============ I/O Errors ============
    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(String),

    /// File not tracked by this peer
    #[error("File not found: {0}")]
    FileNotFound(String),

    // ============ Configuration & State Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(Cow<'static, str>),
}

impl NodeError {
    /// Returns true if this error is transient and may succeed on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Timeout(_) | NodeError::Connectivity(_) | NodeError::Coordinator(_)
        )
    }

    /// Returns true if this error is permanent and will not succeed on retry
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NodeError::InvalidConfig(_)
                | NodeError::FileNotFound(_)
                | NodeError::HashMismatch
                | NodeError::Integrity { .. }
                | NodeError::InvalidState(_)
        )
    }

    /// Returns true if this error should trigger a retry
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.is_transient() && !matches!(self, NodeError::Timeout(_))
    }

    /// Create a protocol error with static context (zero allocation)
    #[must_use]
    pub const fn protocol(context: &'static str) -> Self {
        NodeError::Protocol(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        NodeError::Timeout(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }

    /// Create a coordinator error with static context (zero allocation)
    #[must_use]
    pub const fn coordinator(context: &'static str) -> Self {
        NodeError::Coordinator(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<FrameError> for NodeError {
    fn from(err: FrameError) -> Self {
        if err.is_disconnect() {
            NodeError::Connectivity(err.to_string().into())
        } else {
            NodeError::Protocol(err.to_string().into())
        }
    }
}

impl From<FilesError> for NodeError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::DigestMismatch { .. } => NodeError::HashMismatch,
            other => NodeError::Io(other.to_string()),
        }
    }
}

impl From<TrackerError> for NodeError {
    fn from(err: TrackerError) -> Self {
        if err.is_unreachable() {
            NodeError::Connectivity(format!("tracker unreachable: {err}").into())
        } else {
            NodeError::Coordinator(err.to_string().into())
        }
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        NodeError::TaskJoin(err.to_string().into())
    }
}

/// Result type for Node operations
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(NodeError::timeout("read").is_transient());
        assert!(NodeError::Connectivity(Cow::Borrowed("refused")).is_transient());
        assert!(NodeError::coordinator("busy").is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(NodeError::InvalidConfig(Cow::Borrowed("test")).is_permanent());
        assert!(NodeError::HashMismatch.is_permanent());
        assert!(
            NodeError::Integrity {
                file_id: "a".into(),
                corrupted: vec![3]
            }
            .is_permanent()
        );
        assert!(NodeError::FileNotFound("a".into()).is_permanent());
    }

    #[test]
    fn test_should_retry() {
        assert!(NodeError::Connectivity(Cow::Borrowed("reset")).should_retry());
        assert!(!NodeError::timeout("read").should_retry());
        assert!(!NodeError::protocol("bad frame").should_retry());
    }

    #[test]
    fn test_mutual_exclusivity() {
        let errors = [
            NodeError::timeout("t"),
            NodeError::protocol("p"),
            NodeError::HashMismatch,
            NodeError::invalid_state("s"),
            NodeError::coordinator("c"),
        ];
        for err in &errors {
            assert!(!(err.is_transient() && err.is_permanent()));
        }
    }

    #[test]
    fn test_frame_error_conversion() {
        let err: NodeError = FrameError::ConnectionClosed.into();
        assert!(matches!(err, NodeError::Connectivity(_)));

        let err: NodeError = FrameError::UnknownKind(7).into();
        assert!(matches!(err, NodeError::Protocol(_)));
    }

    #[test]
    fn test_digest_mismatch_conversion() {
        let err: NodeError = FilesError::DigestMismatch {
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(matches!(err, NodeError::HashMismatch));
    }

    #[test]
    fn test_integrity_display_lists_chunks() {
        let err = NodeError::Integrity {
            file_id: "notes.txt".into(),
            corrupted: vec![6],
        };
        assert!(err.to_string().contains("[6]"));
    }
}
