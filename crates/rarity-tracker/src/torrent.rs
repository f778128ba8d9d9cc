//! Per-file swarm bookkeeping and rarest-first selection.
//!
//! A [`Torrent`] owns the availability matrix of one file together with the
//! two views derived from it: the replication count of every chunk and the
//! list of known holders of every chunk. All three are only ever changed
//! together, so `chunk_freq[i]` always equals the number of `true` entries
//! in column `i` of the matrix.

use crate::error::CoordinatorError;
use crate::types::{ChunkAssignment, ChunkMatrix, PeerId, TorrentInfo};
use rand::Rng;
use rand::seq::SliceRandom;

/// Largest chunk count a torrent may announce
pub const MAX_TOTAL_CHUNKS: u32 = 1 << 20;

/// Swarm state for a single file
#[derive(Debug, Clone)]
pub struct Torrent {
    file_id: String,
    total_chunks: u32,
    matrix: ChunkMatrix,
    chunk_freq: Vec<u32>,
    chunk_holders: Vec<Vec<PeerId>>,
    origin: PeerId,
}

impl Torrent {
    /// Build a torrent from a full availability matrix
    ///
    /// # Errors
    ///
    /// Returns an error if `file_id` is empty, `total_chunks` exceeds
    /// [`MAX_TOTAL_CHUNKS`], or any row length differs from `total_chunks`.
    pub fn new(
        file_id: impl Into<String>,
        total_chunks: u32,
        matrix: ChunkMatrix,
        origin: PeerId,
    ) -> Result<Self, CoordinatorError> {
        let file_id = file_id.into();
        if file_id.is_empty() {
            return Err(CoordinatorError::EmptyFileId);
        }
        if total_chunks > MAX_TOTAL_CHUNKS {
            return Err(CoordinatorError::TooManyChunks {
                total_chunks,
                max: MAX_TOTAL_CHUNKS,
            });
        }

        let mut chunk_freq = vec![0u32; total_chunks as usize];
        // One list per chunk; never share a list between indices
        let mut chunk_holders: Vec<Vec<PeerId>> = vec![Vec::new(); total_chunks as usize];

        for (peer, row) in &matrix {
            if row.len() != total_chunks as usize {
                return Err(CoordinatorError::MatrixShape {
                    peer: peer.clone(),
                    expected: total_chunks,
                    actual: row.len(),
                });
            }
            for (i, &held) in row.iter().enumerate() {
                if held {
                    chunk_freq[i] += 1;
                    chunk_holders[i].push(peer.clone());
                }
            }
        }

        Ok(Self {
            file_id,
            total_chunks,
            matrix,
            chunk_freq,
            chunk_holders,
            origin,
        })
    }

    /// Record that `peer` now holds `chunk_id`
    ///
    /// Returns `true` if the holding is new. Repeated reports leave the
    /// counts untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_id` is out of range.
    pub fn mark_held(&mut self, peer: &str, chunk_id: u32) -> Result<bool, CoordinatorError> {
        if chunk_id >= self.total_chunks {
            return Err(CoordinatorError::ChunkOutOfRange {
                chunk_id,
                total_chunks: self.total_chunks,
            });
        }

        let total = self.total_chunks as usize;
        let row = self
            .matrix
            .entry(peer.to_string())
            .or_insert_with(|| vec![false; total]);

        let slot = &mut row[chunk_id as usize];
        if *slot {
            return Ok(false);
        }

        *slot = true;
        self.chunk_freq[chunk_id as usize] += 1;
        self.chunk_holders[chunk_id as usize].push(peer.to_string());
        Ok(true)
    }

    /// Rarest chunk `peer` is missing
    ///
    /// Picks the smallest replication count among missing chunks, lowest
    /// index on ties. A peer without a matrix row is missing every chunk.
    #[must_use]
    pub fn rarest_missing(&self, peer: &str) -> Option<u32> {
        let row = self.matrix.get(peer);
        let held = |i: usize| row.is_some_and(|r| r[i]);

        (0..self.total_chunks as usize)
            .filter(|&i| !held(i))
            // min_by_key keeps the first minimum, i.e. the lowest index
            .min_by_key(|&i| self.chunk_freq[i])
            .map(|i| i as u32)
    }

    /// Choose the next chunk for `peer` and a holder to fetch it from
    ///
    /// The holder is drawn uniformly from the chunk's known holders. With no
    /// holder, or nothing missing, the torrent's origin is returned.
    pub fn select<R: Rng + ?Sized>(&self, peer: &str, rng: &mut R) -> ChunkAssignment {
        let Some(chunk_id) = self.rarest_missing(peer) else {
            return ChunkAssignment {
                chunk_id: None,
                holder: self.origin.clone(),
            };
        };

        let candidates: Vec<&PeerId> = self.chunk_holders[chunk_id as usize]
            .iter()
            .filter(|h| h.as_str() != peer)
            .collect();

        let holder = candidates
            .choose(rng)
            .map_or_else(|| self.origin.clone(), |h| (*h).clone());

        ChunkAssignment {
            chunk_id: Some(chunk_id),
            holder,
        }
    }

    /// Check that the derived views agree with the matrix
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (0..self.total_chunks as usize).all(|i| {
            let column = self.matrix.values().filter(|row| row[i]).count();
            column == self.chunk_freq[i] as usize && column == self.chunk_holders[i].len()
        })
    }

    /// Snapshot of this torrent
    #[must_use]
    pub fn info(&self) -> TorrentInfo {
        TorrentInfo {
            file_id: self.file_id.clone(),
            total_chunks: self.total_chunks,
            origin: self.origin.clone(),
            chunk_freq: self.chunk_freq.clone(),
            chunk_holders: self.chunk_holders.clone(),
            chunk_data: self.matrix.clone(),
        }
    }

    /// File identifier
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Number of chunks
    #[must_use]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Fallback holder
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Replication count per chunk
    #[must_use]
    pub fn chunk_freq(&self) -> &[u32] {
        &self.chunk_freq
    }

    /// Known holders of a chunk
    #[must_use]
    pub fn holders(&self, chunk_id: u32) -> Option<&[PeerId]> {
        self.chunk_holders.get(chunk_id as usize).map(Vec::as_slice)
    }

    /// Availability matrix
    #[must_use]
    pub fn matrix(&self) -> &ChunkMatrix {
        &self.matrix
    }
}
