//! Corruption recovery
//!
//! ```text
//! Requester                             Holder
//!   |── Text("RECOVER:<file>") ──────────►|
//!   |◄── Text("<d0>,<d1>,...") | MISSING ─|
//!   |   diff against local chunk digests  |
//!   |── Text("corrupt|<i>") ─────────────►|
//!   |◄──────────────────── Data(bytes) ───|  ... per corrupted chunk
//!   |   replace, reassemble, re-verify    |
//! ```
//!
//! A round is repeated at most `max_recovery_attempts` times.

use super::connection::{PeerStream, resolve_peer};
use super::error::{NodeError, Result};
use super::node::Node;
use super::pull::write_and_verify;
use crate::frame::{Command, Frame, MISSING, corrupt_request};
use rarity_files::{find_corrupted_chunks, verify_chunk};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Result of a successful recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Chunks that were replaced, in index order
    pub repaired: Vec<u32>,
    /// Rounds used
    pub attempts: u32,
    /// Verified output file
    pub path: PathBuf,
}

impl Node {
    /// Repair corrupted chunks of `file_id` from `source`, then re-verify
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Integrity`] listing the chunks that still do not
    /// verify once every attempt is used, or an error if `source` does not
    /// hold the complete file.
    pub async fn recover(&self, file_id: &str, source: &str) -> Result<RecoveryReport> {
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;
        let max_attempts = self.inner.config.transfer.max_recovery_attempts;
        let output = self.inner.config.output_dir.join(file_id);

        let mut repaired = BTreeSet::new();
        let mut remaining: Vec<u32> = Vec::new();

        for attempt in 1..=max_attempts {
            match self.recovery_round(file_id, source, &mut repaired).await {
                Ok(still_bad) => remaining = still_bad,
                Err(e @ NodeError::Protocol(_)) => {
                    handle.lock().await.mark_failed(e.to_string());
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        "Recovery round {} for {} from {} failed: {}",
                        attempt,
                        file_id,
                        source,
                        e
                    );
                    continue;
                }
            }

            if !remaining.is_empty() {
                tracing::warn!(
                    "Round {}: chunks {:?} of {} still corrupted",
                    attempt,
                    remaining,
                    file_id
                );
                continue;
            }

            let (chunks, digest) = {
                let file = handle.lock().await;
                let chunks: Option<Vec<Vec<u8>>> = file
                    .ordered_chunks()
                    .map(|c| c.into_iter().map(<[u8]>::to_vec).collect());
                (chunks, file.digest().map(str::to_string))
            };
            let (Some(chunks), Some(digest)) = (chunks, digest) else {
                return Err(NodeError::invalid_state("Cannot verify incomplete file"));
            };

            match write_and_verify(chunks, output.clone(), digest).await {
                Ok(()) => {
                    handle.lock().await.mark_complete(output.clone());
                    self.inner.stats.file_received();
                    let report = RecoveryReport {
                        repaired: repaired.into_iter().collect(),
                        attempts: attempt,
                        path: output,
                    };
                    tracing::info!(
                        "Recovered {} after {} round(s), repaired {:?}",
                        file_id,
                        report.attempts,
                        report.repaired
                    );
                    return Ok(report);
                }
                Err(NodeError::HashMismatch) => {
                    tracing::warn!(
                        "Round {}: chunks verify but {} digest still differs",
                        attempt,
                        file_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        handle
            .lock()
            .await
            .mark_failed(format!("corrupted chunks {remaining:?}"));
        Err(NodeError::Integrity {
            file_id: file_id.to_string(),
            corrupted: remaining,
        })
    }

    /// Indices of local chunks that differ from `source`'s copy
    ///
    /// Missing chunks count as corrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` cannot be reached or lacks the file.
    pub async fn corrupted_chunks(&self, file_id: &str, source: &str) -> Result<Vec<u32>> {
        let mut stream = self.open_recovery(file_id, source).await?;
        let reference = receive_digests(&mut stream).await?;
        stream.shutdown().await;
        self.diff_against(file_id, &reference).await
    }

    /// One round: diff, request every corrupted chunk, replace verified ones
    ///
    /// Returns the chunks that are still bad afterwards.
    async fn recovery_round(
        &self,
        file_id: &str,
        source: &str,
        repaired: &mut BTreeSet<u32>,
    ) -> Result<Vec<u32>> {
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;

        let mut stream = self.open_recovery(file_id, source).await?;
        let reference = receive_digests(&mut stream).await?;
        let corrupted = self.diff_against(file_id, &reference).await?;
        if !corrupted.is_empty() {
            tracing::info!(
                "Requesting {} corrupted chunk(s) of {} from {}: {:?}",
                corrupted.len(),
                file_id,
                source,
                corrupted
            );
        }

        let mut still_bad = Vec::new();
        for &index in &corrupted {
            stream.send_text(corrupt_request(index)).await?;
            let data = stream.recv_data().await?;
            self.inner.stats.chunk_received(data.len());

            if verify_chunk(&data, &reference[index as usize]) {
                handle.lock().await.replace(index, data);
                repaired.insert(index);
            } else {
                still_bad.push(index);
            }
        }

        stream.shutdown().await;
        Ok(still_bad)
    }

    async fn open_recovery(&self, file_id: &str, source: &str) -> Result<PeerStream> {
        let transfer = &self.inner.config.transfer;
        let addr = resolve_peer(source).await?;
        let mut stream =
            PeerStream::connect(addr, transfer.connect_timeout, transfer.io_timeout).await?;
        self.inner.stats.connection_succeeded();

        let request = Command::Recover {
            file_id: file_id.to_string(),
        };
        stream.send(&Frame::text(request.to_text())).await?;
        Ok(stream)
    }

    async fn diff_against(&self, file_id: &str, reference: &[String]) -> Result<Vec<u32>> {
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;
        let file = handle.lock().await;

        if reference.len() != file.total_chunks() as usize {
            return Err(NodeError::Protocol(
                format!(
                    "source lists {} chunk digests, {} has {} chunks",
                    reference.len(),
                    file_id,
                    file.total_chunks()
                )
                .into(),
            ));
        }

        let local: Vec<&[u8]> = (0..file.total_chunks())
            .map(|i| file.chunk(i).unwrap_or_default())
            .collect();
        let mut corrupted = find_corrupted_chunks(&local, reference);

        // An empty slot only matches the digest of an empty chunk
        for i in file.missing_chunks() {
            if !corrupted.contains(&i) {
                corrupted.push(i);
            }
        }
        corrupted.sort_unstable();
        Ok(corrupted)
    }
}

async fn receive_digests(stream: &mut PeerStream) -> Result<Vec<String>> {
    let text = stream.recv_text().await?;
    if text == MISSING {
        return Err(NodeError::Protocol(
            format!("{} does not hold the complete file", stream.peer_addr()).into(),
        ));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text.split(',').map(str::to_string).collect())
}
