//! Tracker request/response schemas and shared swarm types.
//!
//! Field names follow the tracker's JSON API exactly (`file_size` is the
//! chunk count, `node` is the holder identity).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

/// Peer identity, canonical `"host:port"` form
pub type PeerId = String;

/// Chunk-availability matrix: peer -> possession flags, one per chunk
pub type ChunkMatrix = BTreeMap<PeerId, Vec<bool>>;

/// Build the canonical peer identity for an address
///
/// IPv6 hosts are bracketed so the identity parses back as a `SocketAddr`.
#[must_use]
pub fn peer_id(ip: IpAddr, port: u16) -> PeerId {
    SocketAddr::new(ip, port).to_string()
}

/// Result of a rarest-first selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAssignment {
    /// Chunk to fetch, `None` when the requester is missing nothing
    pub chunk_id: Option<u32>,
    /// Peer to fetch it from
    pub holder: PeerId,
}

impl From<ChunkAssignment> for RequestChunkResponse {
    fn from(assignment: ChunkAssignment) -> Self {
        Self {
            chunk_id: assignment.chunk_id.map_or(-1, i64::from),
            node: assignment.holder,
        }
    }
}

impl From<RequestChunkResponse> for ChunkAssignment {
    fn from(resp: RequestChunkResponse) -> Self {
        Self {
            chunk_id: u32::try_from(resp.chunk_id).ok(),
            holder: resp.node,
        }
    }
}

/// Per-peer transfer counters, collected by each peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Chunk bytes sent to other peers
    pub bytes_uploaded: u64,
    /// Chunk bytes received from other peers
    pub bytes_downloaded: u64,
    /// Chunks sent
    pub chunks_uploaded: u64,
    /// Chunks received
    pub chunks_downloaded: u64,
    /// Push sessions completed in full
    pub files_uploaded: u64,
    /// Files reassembled and verified
    pub files_downloaded: u64,
    /// Connections accepted or established
    pub connections_succeeded: u64,
    /// Connection attempts or sessions that failed
    pub connections_failed: u64,
}

/// Coordinator-side counters for one peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCounters {
    /// Chunk holdings reported through `update_chunk`
    pub chunks_downloaded: u64,
    /// Latest counters the peer reported about itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<TransferStats>,
}

/// Snapshot of one torrent's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// File identifier (base name)
    pub file_id: String,
    /// Number of chunks
    pub total_chunks: u32,
    /// Peer that initialized the torrent
    pub origin: PeerId,
    /// Replication count per chunk
    pub chunk_freq: Vec<u32>,
    /// Known holders per chunk
    pub chunk_holders: Vec<Vec<PeerId>>,
    /// Availability matrix
    pub chunk_data: ChunkMatrix,
}

/// Body carrying only the caller's listening port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortRequest {
    /// Caller's listening port
    pub port: Option<u16>,
}

/// Plain `{message}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: String,
}

/// Error body returned with 4xx statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error
    pub error: String,
    /// Machine-readable error kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// `GET /peers` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    /// Registered peers, excluding the caller
    pub available_peers: Vec<PeerId>,
}

/// `POST /initialize_chunks` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeChunksRequest {
    /// File identifier (base name)
    pub file_id: String,
    /// Number of chunks
    pub file_size: u32,
    /// Availability matrix after the push phase
    pub chunk_data: ChunkMatrix,
    /// Originator's listening port
    pub port: u16,
}

/// `POST /initialize_chunks` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeChunksResponse {
    /// Human-readable outcome
    pub message: String,
    /// Stored availability matrix
    pub torrent_info: ChunkMatrix,
}

/// `POST /update_chunk` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChunkRequest {
    /// File identifier
    pub file_id: String,
    /// Reporter's listening port
    pub port: u16,
    /// Newly held chunk
    pub chunk_id: u32,
}

/// `POST /update_chunk` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChunkResponse {
    /// Human-readable outcome
    pub message: String,
    /// Availability matrix after the update
    pub chunk_data: ChunkMatrix,
}

/// `GET /request_chunk` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestChunkRequest {
    /// File identifier
    pub file_id: String,
    /// Requester's listening port
    pub port: u16,
}

/// `GET /request_chunk` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestChunkResponse {
    /// Chunk to fetch, `-1` when nothing is missing
    pub chunk_id: i64,
    /// Holder identity
    pub node: PeerId,
}

/// `GET /torrent` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentRequest {
    /// File identifier
    pub file_id: String,
}

/// `POST /report_stats` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatsRequest {
    /// Reporter's listening port
    pub port: u16,
    /// Reporter's local counters
    pub stats: TransferStats,
}
