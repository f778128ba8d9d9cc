//! Local transfer counters.

use rarity_tracker::TransferStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters incremented by every session a peer runs
///
/// Shared by all connection tasks; each event is a single relaxed add.
#[derive(Debug, Default)]
pub struct PeerStats {
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    chunks_uploaded: AtomicU64,
    chunks_downloaded: AtomicU64,
    files_uploaded: AtomicU64,
    files_downloaded: AtomicU64,
    connections_succeeded: AtomicU64,
    connections_failed: AtomicU64,
}

impl PeerStats {
    /// Zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A chunk of `bytes` was sent
    pub fn chunk_sent(&self, bytes: usize) {
        self.chunks_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A chunk of `bytes` was received
    pub fn chunk_received(&self, bytes: usize) {
        self.chunks_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A push session delivered every chunk it carried
    pub fn file_sent(&self) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// A file was reassembled and verified
    pub fn file_received(&self) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection was accepted or established
    pub fn connection_succeeded(&self) {
        self.connections_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection attempt or session failed
    pub fn connection_failed(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy
    #[must_use]
    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            chunks_uploaded: self.chunks_uploaded.load(Ordering::Relaxed),
            chunks_downloaded: self.chunks_downloaded.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            connections_succeeded: self.connections_succeeded.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
        }
    }
}
