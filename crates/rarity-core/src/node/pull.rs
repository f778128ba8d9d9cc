//! Rarest-first pull loop and final reassembly.

use super::connection::{PeerStream, resolve_peer};
use super::error::{NodeError, Result};
use super::node::Node;
use crate::frame::{Command, Frame};
use rarity_files::{FilesError, reassemble};
use rarity_tracker::ChunkAssignment;
use std::path::PathBuf;

impl Node {
    /// Pull every missing chunk of `file_id`, then reassemble and verify
    ///
    /// The file must already be known locally (a push session created it).
    /// If another pull of the same file is running, this waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if no tracker is configured, the tracker never
    /// initializes the torrent, too many fetches fail in a row, or the file
    /// cannot be verified.
    pub async fn pull_file(&self, file_id: &str) -> Result<PathBuf> {
        self.tracker()?;
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;

        {
            let mut file = handle.lock().await;
            if file.is_complete() {
                return file
                    .output_path()
                    .cloned()
                    .ok_or_else(|| NodeError::invalid_state("Complete file has no path"));
            }
            if !file.begin_pull() {
                drop(file);
                return self.wait_for_file(file_id).await;
            }
        }

        let result = match self.pull_missing(file_id).await {
            Ok(()) => self.finalize(file_id).await,
            Err(e) => Err(e),
        };

        let mut file = handle.lock().await;
        file.end_pull();
        if let Err(e) = &result {
            if !file.is_complete() {
                file.mark_failed(e.to_string());
            }
        }
        result
    }

    async fn pull_missing(&self, file_id: &str) -> Result<()> {
        let tracker = self.tracker()?;
        let port = self.port().await?;
        let max_failures = self.inner.config.transfer.max_fetch_failures;
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;

        let mut failures = 0u32;
        loop {
            let missing = handle.lock().await.missing_chunks();
            if missing.is_empty() {
                return Ok(());
            }

            let assignment = self.request_assignment(file_id, port).await?;
            let (chunk_id, holder) = match assignment.chunk_id {
                // Tracker thinks we are complete; fall back to the origin
                None => (missing[0], assignment.holder),
                Some(id) => (id, assignment.holder),
            };

            if handle.lock().await.has_chunk(chunk_id) {
                // Held locally but unknown to the tracker
                tracker.update_chunk(file_id, port, chunk_id).await?;
                continue;
            }

            match self.fetch_chunk(&holder, file_id, chunk_id).await {
                Ok(data) => {
                    failures = 0;
                    handle.lock().await.store(chunk_id, data);
                    tracker.update_chunk(file_id, port, chunk_id).await?;
                    tracing::debug!("Pulled chunk {} of {} from {}", chunk_id, file_id, holder);
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "Fetch of chunk {} of {} from {} failed ({}/{}): {}",
                        chunk_id,
                        file_id,
                        holder,
                        failures,
                        max_failures,
                        e
                    );
                    if failures >= max_failures {
                        return Err(e);
                    }
                    tokio::time::sleep(self.inner.config.transfer.tracker_retry_interval).await;
                }
            }
        }
    }

    /// Ask the tracker for the next chunk, waiting out a missing torrent
    async fn request_assignment(&self, file_id: &str, port: u16) -> Result<ChunkAssignment> {
        let tracker = self.tracker()?;
        let transfer = &self.inner.config.transfer;

        let mut attempt = 0;
        loop {
            match tracker.request_chunk(file_id, port).await {
                Ok(assignment) => return Ok(assignment),
                // The seeder publishes the matrix only after its pushes end
                Err(e) if e.is_not_initialized() && attempt < transfer.tracker_retry_attempts => {
                    attempt += 1;
                    tracing::debug!("Torrent {} not initialized yet, retry {}", file_id, attempt);
                    tokio::time::sleep(transfer.tracker_retry_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch one chunk from `holder`
    ///
    /// # Errors
    ///
    /// Returns an error if the holder is unreachable or does not hold it.
    pub async fn fetch_chunk(&self, holder: &str, file_id: &str, chunk_id: u32) -> Result<Vec<u8>> {
        let result = self.fetch_session(holder, file_id, chunk_id).await;
        match &result {
            Ok(data) => self.inner.stats.chunk_received(data.len()),
            Err(_) => self.inner.stats.connection_failed(),
        }
        result
    }

    async fn fetch_session(&self, holder: &str, file_id: &str, chunk_id: u32) -> Result<Vec<u8>> {
        let transfer = &self.inner.config.transfer;
        let addr = resolve_peer(holder).await?;
        let mut stream =
            PeerStream::connect(addr, transfer.connect_timeout, transfer.io_timeout).await?;
        self.inner.stats.connection_succeeded();

        let request = Command::GetChunk {
            file_id: file_id.to_string(),
            chunk_id,
        };
        stream.send(&Frame::text(request.to_text())).await?;
        let data = stream.recv_data().await?;
        stream.shutdown().await;
        Ok(data)
    }

    /// Write the file out and verify it
    ///
    /// The file goes to `output_dir/<file_id>`, replacing any existing
    /// file. On a digest mismatch, corrupted chunks are repaired from the
    /// torrent's origin.
    ///
    /// # Errors
    ///
    /// Returns an error if chunks are missing, the write fails, or the
    /// file cannot be repaired.
    pub async fn finalize(&self, file_id: &str) -> Result<PathBuf> {
        let handle = self
            .local_file(file_id)
            .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;

        let (chunks, digest) = {
            let file = handle.lock().await;
            if file.is_complete() {
                if let Some(path) = file.output_path() {
                    return Ok(path.clone());
                }
            }
            let chunks: Vec<Vec<u8>> = file
                .ordered_chunks()
                .ok_or_else(|| NodeError::invalid_state("Cannot finalize with missing chunks"))?
                .into_iter()
                .map(<[u8]>::to_vec)
                .collect();
            let digest = file
                .digest()
                .map(str::to_string)
                .ok_or_else(|| NodeError::invalid_state("File digest not received"))?;
            (chunks, digest)
        };

        let output = self.inner.config.output_dir.join(file_id);
        match write_and_verify(chunks, output.clone(), digest).await {
            Ok(()) => {
                handle.lock().await.mark_complete(output.clone());
                self.inner.stats.file_received();
                tracing::info!("Verified {} at {}", file_id, output.display());
                Ok(output)
            }
            Err(NodeError::HashMismatch) => {
                tracing::warn!("Digest mismatch for {}, starting recovery", file_id);
                let Some(tracker) = self.inner.tracker.as_ref() else {
                    handle.lock().await.mark_failed("digest mismatch");
                    return Err(NodeError::HashMismatch);
                };
                let origin = tracker.torrent(file_id).await?.origin;
                let report = self.recover(file_id, &origin).await?;
                Ok(report.path)
            }
            Err(e) => Err(e),
        }
    }
}

/// Reassemble on the blocking pool
pub(crate) async fn write_and_verify(
    chunks: Vec<Vec<u8>>,
    output: PathBuf,
    digest: String,
) -> Result<()> {
    tokio::task::spawn_blocking(move || match reassemble(&chunks, &output, &digest) {
        Ok(()) => Ok(()),
        Err(FilesError::DigestMismatch { .. }) => Err(NodeError::HashMismatch),
        Err(e) => Err(NodeError::from(e)),
    })
    .await?
}
