//! Swarm coordinator state
//!
//! The coordinator is constructed once and injected into the HTTP layer. It
//! holds three independent pieces of state:
//! - the peer registry (insertion ordered)
//! - one [`Torrent`] per file, each behind its own lock
//! - server-side counters per peer
//!
//! # Locking
//!
//! Torrents live in a `DashMap` of `Arc<RwLock<Torrent>>`. The map guard is
//! released before the torrent lock is awaited, so operations on different
//! files never block each other. Selection scans take the read lock and
//! always observe a complete update; mutations take the write lock.

use crate::error::CoordinatorError;
use crate::torrent::Torrent;
use crate::types::{ChunkAssignment, ChunkMatrix, PeerCounters, PeerId, TorrentInfo, TransferStats};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the HTTP API listens on
    pub bind_addr: SocketAddr,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_TRACKER_PORT)),
        }
    }
}

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Peer was added
    Registered,
    /// Peer was already known; nothing changed
    AlreadyRegistered,
}

/// Central swarm bookkeeping
#[derive(Default)]
pub struct Coordinator {
    peers: RwLock<Vec<PeerId>>,
    torrents: DashMap<String, Arc<RwLock<Torrent>>>,
    counters: DashMap<PeerId, PeerCounters>,
}

impl Coordinator {
    /// Create an empty coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to the registry
    ///
    /// Idempotent; a new peer also gets a zeroed statistics record.
    pub async fn register_peer(&self, peer: PeerId) -> Registration {
        let mut peers = self.peers.write().await;
        if peers.contains(&peer) {
            tracing::debug!("Peer {} already registered", peer);
            return Registration::AlreadyRegistered;
        }

        self.counters.entry(peer.clone()).or_default();
        tracing::info!("Registered peer {} ({} total)", peer, peers.len() + 1);
        peers.push(peer);
        Registration::Registered
    }

    /// Registered peers other than `requester`
    pub async fn list_peers(&self, requester: &str) -> Vec<PeerId> {
        self.peers
            .read()
            .await
            .iter()
            .filter(|p| p.as_str() != requester)
            .cloned()
            .collect()
    }

    /// Number of registered peers
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Create or overwrite the torrent for `file_id`
    ///
    /// # Errors
    ///
    /// Returns an error if `file_id` is empty, the chunk count is above
    /// the limit, or the matrix shape is wrong. A rejected request leaves any existing torrent untouched.
    pub async fn initialize_chunks(
        &self,
        file_id: &str,
        total_chunks: u32,
        matrix: ChunkMatrix,
        origin: PeerId,
    ) -> Result<ChunkMatrix, CoordinatorError> {
        let torrent = Torrent::new(file_id, total_chunks, matrix, origin)?;
        let stored = torrent.matrix().clone();

        if self
            .torrents
            .insert(file_id.to_string(), Arc::new(RwLock::new(torrent)))
            .is_some()
        {
            tracing::warn!("Torrent {} re-initialized, previous state replaced", file_id);
        }

        tracing::info!(
            "Initialized torrent {} ({} chunks, {} peers in matrix)",
            file_id,
            total_chunks,
            stored.len()
        );
        Ok(stored)
    }

    /// Record that `peer` holds `chunk_id` of `file_id`
    ///
    /// Returns the availability matrix after the update.
    ///
    /// # Errors
    ///
    /// Returns an error if the torrent is unknown or `chunk_id` is out of range.
    pub async fn update_chunk(
        &self,
        file_id: &str,
        peer: &str,
        chunk_id: u32,
    ) -> Result<ChunkMatrix, CoordinatorError> {
        let torrent = self.torrent(file_id)?;
        let mut guard = torrent.write().await;

        if guard.mark_held(peer, chunk_id)? {
            self.counters
                .entry(peer.to_string())
                .or_default()
                .chunks_downloaded += 1;
            tracing::debug!(
                "{} now holds chunk {} of {} (freq {})",
                peer,
                chunk_id,
                file_id,
                guard.chunk_freq()[chunk_id as usize]
            );
        }

        Ok(guard.matrix().clone())
    }

    /// Rarest-first selection for `peer`
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotInitialized`] for an unknown torrent.
    pub async fn request_chunk(
        &self,
        file_id: &str,
        peer: &str,
    ) -> Result<ChunkAssignment, CoordinatorError> {
        let torrent = self.torrent(file_id)?;
        let guard = torrent.read().await;
        let assignment = guard.select(peer, &mut rand::thread_rng());

        tracing::debug!(
            "Assigned chunk {:?} of {} to {} from {}",
            assignment.chunk_id,
            file_id,
            peer,
            assignment.holder
        );
        Ok(assignment)
    }

    /// Snapshot of one torrent
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotInitialized`] for an unknown torrent.
    pub async fn torrent_info(&self, file_id: &str) -> Result<TorrentInfo, CoordinatorError> {
        let torrent = self.torrent(file_id)?;
        let info = torrent.read().await.info();
        Ok(info)
    }

    /// Store the counters a peer reported about itself
    pub fn report_stats(&self, peer: &str, stats: TransferStats) {
        self.counters.entry(peer.to_string()).or_default().reported = Some(stats);
    }

    /// Per-peer counters, ordered by peer
    #[must_use]
    pub fn statistics(&self) -> BTreeMap<PeerId, PeerCounters> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of known torrents
    #[must_use]
    pub fn torrent_count(&self) -> usize {
        self.torrents.len()
    }

    fn torrent(&self, file_id: &str) -> Result<Arc<RwLock<Torrent>>, CoordinatorError> {
        // Clone the Arc so the map shard is not held across an await
        self.torrents
            .get(file_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| CoordinatorError::NotInitialized(file_id.to_string()))
    }
}
