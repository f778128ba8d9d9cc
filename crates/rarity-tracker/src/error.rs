//! Coordinator and tracker-client errors.

use thiserror::Error;

/// Errors from coordinator state operations
///
/// These are returned to the caller as explicit error responses, never
/// treated as server failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Operation on a file that was never initialized
    #[error("torrent not initialized: {0}")]
    NotInitialized(String),

    /// Chunk index beyond the torrent's chunk count
    #[error("chunk {chunk_id} out of range (total {total_chunks})")]
    ChunkOutOfRange {
        /// Requested chunk
        chunk_id: u32,
        /// Torrent's chunk count
        total_chunks: u32,
    },

    /// Matrix row length differs from the chunk count
    #[error("matrix row for {peer} has {actual} entries, expected {expected}")]
    MatrixShape {
        /// Offending peer
        peer: String,
        /// Torrent's chunk count
        expected: u32,
        /// Row length received
        actual: usize,
    },

    /// Empty file identifier
    #[error("file_id must not be empty")]
    EmptyFileId,

    /// Announced chunk count above the tracker's limit
    #[error("{total_chunks} chunks exceeds the limit of {max}")]
    TooManyChunks {
        /// Announced chunk count
        total_chunks: u32,
        /// Largest accepted count
        max: u32,
    },
}

impl CoordinatorError {
    /// Machine-readable kind, carried in API error bodies
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::NotInitialized(_) => "not_initialized",
            CoordinatorError::ChunkOutOfRange { .. } => "chunk_out_of_range",
            CoordinatorError::MatrixShape { .. } => "matrix_shape",
            CoordinatorError::EmptyFileId => "empty_file_id",
            CoordinatorError::TooManyChunks { .. } => "too_many_chunks",
        }
    }
}

/// Errors from the tracker HTTP client
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transport-level HTTP failure (refused, reset, timeout)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Tracker answered with an error status
    #[error("tracker returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error kind, when the tracker supplied one
        kind: Option<String>,
        /// Error message
        message: String,
    },

    /// Response body did not match the expected schema
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Tracker URL is not http(s)
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TrackerError {
    /// Returns true when the tracker reported an uninitialized torrent
    #[must_use]
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, TrackerError::Api { kind: Some(kind), .. } if kind == "not_initialized")
    }

    /// Returns true when the tracker could not be reached at all
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TrackerError::Http(e) if e.is_connect() || e.is_timeout())
    }
}
