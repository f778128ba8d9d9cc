//! Seeding: split a file, push disjoint blocks to every peer, publish the
//! resulting availability matrix.
//!
//! ```text
//!            chunks 0..10
//!   ┌──────────────┴──────────────┐
//!   0..5 ──► peer A        5..10 ──► peer B
//!   (ACKed chunks only)    (ACKed chunks only)
//!            └──────────┬─────────┘
//!          initialize_chunks(matrix)
//! ```
//!
//! Each peer is served by its own task; a failing peer only affects its own
//! outcome. The seeder keeps the whole file and acts as the fallback holder.

use super::connection::{PeerStream, resolve_peer};
use super::error::{NodeError, Result};
use super::node::{Node, file_id_for};
use crate::frame::{Frame, PushHeader, READY, ACK, is_reserved_name};
use rarity_tracker::{ChunkMatrix, PeerId};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Result of pushing to one peer
#[derive(Debug, Clone)]
pub struct PeerOutcome {
    /// Receiving peer
    pub peer: PeerId,
    /// Chunks the peer acknowledged
    pub delivered: Vec<u32>,
    /// Chunks this peer was assigned
    pub assigned: Range<u32>,
    /// Why the session ended early
    pub error: Option<NodeError>,
}

impl PeerOutcome {
    /// Returns true if every assigned chunk was acknowledged
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.delivered.len() == self.assigned.len()
    }
}

/// Result of a seed operation
#[derive(Debug, Clone)]
pub struct SeedReport {
    /// File identifier
    pub file_id: String,
    /// Chunks in the file
    pub total_chunks: u32,
    /// Whole-file digest
    pub digest: String,
    /// One entry per peer, in tracker order
    pub outcomes: Vec<PeerOutcome>,
}

impl SeedReport {
    /// Total chunks acknowledged across peers
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.delivered.len()).sum()
    }

    /// Peers whose session failed
    pub fn failed_peers(&self) -> impl Iterator<Item = &PeerOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Progress notifications from [`Node::seed_file_with`]
#[derive(Debug)]
pub enum SeedEvent<'a> {
    /// Pushes are about to start
    Started {
        /// Peers being pushed to
        peers: usize,
        /// Chunks in the file
        total_chunks: u32,
    },
    /// One peer's session ended
    PeerFinished(&'a PeerOutcome),
}

/// Split `total` chunks into `peers` contiguous, disjoint blocks
///
/// Earlier blocks take the remainder, so sizes differ by at most one.
#[must_use]
pub fn block_ranges(total: u32, peers: usize) -> Vec<Range<u32>> {
    if peers == 0 {
        return Vec::new();
    }

    let peers = peers as u32;
    let base = total / peers;
    let extra = total % peers;

    let mut start = 0;
    (0..peers)
        .map(|i| {
            let len = base + u32::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

impl Node {
    /// Seed a file to every registered peer
    ///
    /// # Errors
    ///
    /// Returns an error if the node is stopped, no tracker is configured, the
    /// file cannot be read, or the tracker rejects the matrix. Failures of
    /// individual peers are reported in [`SeedReport::outcomes`].
    pub async fn seed_file(&self, path: impl AsRef<Path>) -> Result<SeedReport> {
        self.seed_file_with(path, |_| {}).await
    }

    /// [`Node::seed_file`] with progress callbacks
    ///
    /// # Errors
    ///
    /// See [`Node::seed_file`].
    pub async fn seed_file_with<F>(&self, path: impl AsRef<Path>, mut on_event: F) -> Result<SeedReport>
    where
        F: FnMut(SeedEvent<'_>),
    {
        self.ensure_running()?;
        let tracker = self.tracker()?.clone();
        let port = self.port().await?;

        let path = path.as_ref();
        let file_id = file_id_for(path)?;
        if is_reserved_name(&file_id) {
            return Err(NodeError::Protocol(
                format!("file name {file_id:?} collides with a wire command").into(),
            ));
        }

        self.import_file(path).await?;
        let (chunks, digest) = {
            let handle = self
                .local_file(&file_id)
                .ok_or_else(|| NodeError::FileNotFound(file_id.clone()))?;
            let file = handle.lock().await;
            let chunks: Vec<Vec<u8>> = file
                .ordered_chunks()
                .ok_or_else(|| NodeError::invalid_state("Imported file is incomplete"))?
                .into_iter()
                .map(<[u8]>::to_vec)
                .collect();
            let digest = file
                .digest()
                .map(str::to_string)
                .ok_or_else(|| NodeError::invalid_state("Imported file has no digest"))?;
            (Arc::new(chunks), digest)
        };
        let total_chunks = chunks.len() as u32;

        let peers = tracker.peers(port).await?;
        let ranges = block_ranges(total_chunks, peers.len());
        tracing::info!(
            "Seeding {} ({} chunks) to {} peers",
            file_id,
            total_chunks,
            peers.len()
        );
        on_event(SeedEvent::Started {
            peers: peers.len(),
            total_chunks,
        });

        let mut tasks = JoinSet::new();
        for (slot, (peer, range)) in peers.iter().cloned().zip(ranges).enumerate() {
            let node = self.clone();
            let file_id = file_id.clone();
            let chunks = Arc::clone(&chunks);
            let digest = digest.clone();
            tasks.spawn(async move {
                let outcome = node
                    .push_to_peer(&peer, &file_id, &chunks, &digest, range)
                    .await;
                (slot, outcome)
            });
        }

        let mut finished: Vec<Option<PeerOutcome>> = vec![None; peers.len()];
        while let Some(joined) = tasks.join_next().await {
            let (slot, outcome) = joined?;
            on_event(SeedEvent::PeerFinished(&outcome));
            finished[slot] = Some(outcome);
        }
        let outcomes: Vec<PeerOutcome> = finished.into_iter().flatten().collect();

        // Matrix reflects acknowledged chunks only
        let mut matrix = ChunkMatrix::new();
        for outcome in &outcomes {
            let mut row = vec![false; total_chunks as usize];
            for &i in &outcome.delivered {
                row[i as usize] = true;
            }
            matrix.insert(outcome.peer.clone(), row);
        }
        tracker
            .initialize_chunks(&file_id, total_chunks, matrix, port)
            .await?;

        let report = SeedReport {
            file_id,
            total_chunks,
            digest,
            outcomes,
        };
        tracing::info!(
            "Seeded {}: {} chunks delivered, {} peers failed",
            report.file_id,
            report.delivered_count(),
            report.failed_peers().count()
        );
        Ok(report)
    }

    /// Push `indices` of a file to one peer
    ///
    /// Never fails as a whole: the outcome lists what the peer acknowledged
    /// before any error.
    pub async fn push_to_peer(
        &self,
        peer: &str,
        file_id: &str,
        chunks: &[Vec<u8>],
        digest: &str,
        indices: Range<u32>,
    ) -> PeerOutcome {
        let mut delivered = Vec::with_capacity(indices.len());
        let result = self
            .push_session(peer, file_id, chunks, digest, indices.clone(), &mut delivered)
            .await;

        let error = match result {
            Ok(()) => {
                self.inner.stats.file_sent();
                tracing::info!("Pushed {} chunks of {} to {}", delivered.len(), file_id, peer);
                None
            }
            Err(e) => {
                self.inner.stats.connection_failed();
                tracing::warn!(
                    "Push of {} to {} failed after {} chunks: {}",
                    file_id,
                    peer,
                    delivered.len(),
                    e
                );
                Some(e)
            }
        };

        PeerOutcome {
            peer: peer.to_string(),
            delivered,
            assigned: indices,
            error,
        }
    }

    async fn push_session(
        &self,
        peer: &str,
        file_id: &str,
        chunks: &[Vec<u8>],
        digest: &str,
        indices: Range<u32>,
        delivered: &mut Vec<u32>,
    ) -> Result<()> {
        let total = chunks.len() as u32;
        if indices.end > total {
            return Err(NodeError::invalid_state("Push range exceeds chunk count"));
        }

        let transfer = &self.inner.config.transfer;
        let addr = resolve_peer(peer).await?;
        let mut stream =
            PeerStream::connect(addr, transfer.connect_timeout, transfer.io_timeout).await?;
        self.inner.stats.connection_succeeded();

        stream.send_text(file_id).await?;
        let header = PushHeader {
            count: indices.len() as u32,
            total,
        };
        stream.send_text(header.to_text()).await?;
        stream.expect_text(READY).await?;

        for index in indices {
            let data = &chunks[index as usize];
            stream
                .send(&Frame::Chunk {
                    index,
                    data: data.clone(),
                })
                .await?;
            stream.expect_text(ACK).await?;

            delivered.push(index);
            self.inner.stats.chunk_sent(data.len());
            tracing::debug!("{} acknowledged chunk {} of {}", peer, index, file_id);
        }

        stream.send_text(digest).await?;
        stream.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(block_ranges(10, 2), vec![0..5, 5..10]);
    }

    #[test]
    fn test_uneven_split() {
        assert_eq!(block_ranges(10, 3), vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_more_peers_than_chunks() {
        let ranges = block_ranges(2, 4);
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn test_no_peers() {
        assert!(block_ranges(10, 0).is_empty());
    }

    #[test]
    fn test_ranges_cover_exactly_once() {
        for total in 0..40u32 {
            for peers in 1..7usize {
                let ranges = block_ranges(total, peers);
                let flat: Vec<u32> = ranges.into_iter().flatten().collect();
                assert_eq!(flat, (0..total).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_outcome_success() {
        let ok = PeerOutcome {
            peer: "a:1".into(),
            delivered: vec![0, 1],
            assigned: 0..2,
            error: None,
        };
        assert!(ok.is_success());

        let partial = PeerOutcome {
            delivered: vec![0],
            error: Some(NodeError::protocol("expected ACK")),
            ..ok.clone()
        };
        assert!(!partial.is_success());
    }
}
