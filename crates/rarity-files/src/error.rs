//! Error types for the chunk codec.

use thiserror::Error;

/// Chunk codec errors
#[derive(Debug, Error)]
pub enum FilesError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reassembled output does not match the expected digest
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest the caller expected
        expected: String,
        /// Digest of the written output
        actual: String,
    },

    /// A chunk required for reassembly is absent
    #[error("chunk {0} missing")]
    MissingChunk(u32),

    /// Chunk size of zero requested
    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,
}

impl FilesError {
    /// Returns true for integrity failures that corruption recovery can repair
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, FilesError::DigestMismatch { .. })
    }
}

/// Result type for chunk codec operations
pub type Result<T> = std::result::Result<T, FilesError>;
