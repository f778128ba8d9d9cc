//! Inbound connection handling
//!
//! The first frame of every accepted connection selects the session:
//!
//! ```text
//! GET_CHUNK:<file>:<id>  ──► Data(bytes) | Text(MISSING)
//! RECOVER:<file>         ──► Text(digests) then corrupt|<i> ──► Data(bytes) ...
//! <file name>            ──► push session (receiving side)
//! ```
//!
//! Push session, receiving side:
//!
//! ```text
//! Seeder                              Receiver
//!   |── Text(file) ─────────────────────►|
//!   |── Text("<count>/<total>") ────────►|  allocate (or reuse) chunk state
//!   |◄──────────────────── Text(READY) ──|
//!   |── Chunk(i, bytes) ────────────────►|  store
//!   |◄────────────────────── Text(ACK) ──|  ... once per chunk
//!   |── Text(digest) ───────────────────►|  finalize or start pulling
//! ```

use super::connection::PeerStream;
use super::error::{NodeError, Result};
use super::node::Node;
use crate::frame::{
    ACK, Command, Frame, MISSING, PushHeader, READY, is_reserved_name, parse_corrupt_request,
};
use rarity_files::chunk_digests;

impl Node {
    pub(crate) async fn handle_connection(&self, mut stream: PeerStream) {
        let peer = stream.peer_addr();
        if let Err(e) = self.dispatch(&mut stream).await {
            self.inner.stats.connection_failed();
            tracing::warn!("Session with {} failed: {}", peer, e);
        }
        stream.shutdown().await;
    }

    async fn dispatch(&self, stream: &mut PeerStream) -> Result<()> {
        let Some(first) = stream.try_recv().await? else {
            return Ok(());
        };
        let text = match first {
            Frame::Text(text) => text,
            other => {
                return Err(NodeError::Protocol(
                    format!("session opened with {:?} frame", other.kind()).into(),
                ));
            }
        };

        match Command::parse(&text) {
            Some(Command::GetChunk { file_id, chunk_id }) => {
                self.serve_chunk(stream, &file_id, chunk_id).await
            }
            Some(Command::Recover { file_id }) => self.serve_recovery(stream, &file_id).await,
            Some(Command::Push { file_id }) => self.receive_push(stream, &file_id).await,
            None => Err(NodeError::Protocol(
                format!("malformed command {text:?}").into(),
            )),
        }
    }

    /// Answer a single `GET_CHUNK` request
    async fn serve_chunk(&self, stream: &mut PeerStream, file_id: &str, chunk_id: u32) -> Result<()> {
        let data = match self.local_file(file_id) {
            Some(handle) => handle.lock().await.chunk(chunk_id).map(<[u8]>::to_vec),
            None => None,
        };

        match data {
            Some(data) => {
                let len = data.len();
                stream.send(&Frame::Data(data)).await?;
                self.inner.stats.chunk_sent(len);
                tracing::debug!(
                    "Served chunk {} of {} to {}",
                    chunk_id,
                    file_id,
                    stream.peer_addr()
                );
            }
            None => {
                tracing::debug!(
                    "Chunk {} of {} requested by {} but not held",
                    chunk_id,
                    file_id,
                    stream.peer_addr()
                );
                stream.send_text(MISSING).await?;
            }
        }
        Ok(())
    }

    /// Serve per-chunk digests and resend requested chunks
    async fn serve_recovery(&self, stream: &mut PeerStream, file_id: &str) -> Result<()> {
        let Some(handle) = self.local_file(file_id) else {
            return stream.send_text(MISSING).await;
        };

        let digests = {
            let file = handle.lock().await;
            file.ordered_chunks().map(|chunks| chunk_digests(&chunks))
        };
        let Some(digests) = digests else {
            return stream.send_text(MISSING).await;
        };

        stream.send_text(digests.join(",")).await?;
        tracing::info!("Serving recovery of {} to {}", file_id, stream.peer_addr());

        while let Some(frame) = stream.try_recv().await? {
            let index = frame
                .as_text()
                .and_then(parse_corrupt_request)
                .ok_or_else(|| NodeError::protocol("expected corrupt|<index>"))?;

            let data = handle.lock().await.chunk(index).map(<[u8]>::to_vec);
            match data {
                Some(data) => {
                    let len = data.len();
                    stream.send(&Frame::Data(data)).await?;
                    self.inner.stats.chunk_sent(len);
                    tracing::debug!("Resent chunk {} of {}", index, file_id);
                }
                None => stream.send_text(MISSING).await?,
            }
        }
        Ok(())
    }

    /// Receiving side of a push session
    async fn receive_push(&self, stream: &mut PeerStream, file_id: &str) -> Result<()> {
        validate_file_name(file_id)?;

        let header_text = stream.recv_text().await?;
        let header = PushHeader::parse(&header_text).ok_or_else(|| {
            NodeError::Protocol(format!("bad push header {header_text:?}").into())
        })?;

        let handle = self.ensure_file(file_id, header.total).await?;
        stream.send_text(READY).await?;

        tracing::info!(
            "Receiving {} chunks of {} ({} total) from {}",
            header.count,
            file_id,
            header.total,
            stream.peer_addr()
        );

        for _ in 0..header.count {
            let (index, data) = match stream.recv().await? {
                Frame::Chunk { index, data } => (index, data),
                other => {
                    return Err(NodeError::Protocol(
                        format!("expected chunk, got {:?} frame", other.kind()).into(),
                    ));
                }
            };
            if index >= header.total {
                return Err(NodeError::Protocol(
                    format!("chunk {index} out of range ({} total)", header.total).into(),
                ));
            }

            let len = data.len();
            handle.lock().await.store(index, data);
            self.inner.stats.chunk_received(len);
            stream.send_text(ACK).await?;
        }

        let digest = stream.recv_text().await?;
        if digest.len() != rarity_files::DIGEST_HEX_LEN
            || !digest.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(NodeError::Protocol(
                format!("bad file digest {digest:?}").into(),
            ));
        }

        let (has_all, claimed) = {
            let mut file = handle.lock().await;
            file.set_digest(digest.to_ascii_lowercase());
            (file.has_all_chunks(), file.begin_finalize())
        };
        stream.shutdown().await;

        if claimed {
            let result = self.finalize(file_id).await;
            let mut file = handle.lock().await;
            file.end_pull();
            if let Err(e) = &result {
                if !file.is_complete() {
                    file.mark_failed(e.to_string());
                }
            }
            result.map(|_| ())
        } else {
            // Complete, or a pull or another session finalizes it
            let auto_pull =
                self.inner.config.transfer.auto_pull && self.inner.tracker.is_some();
            if !has_all && auto_pull {
                self.spawn_pull(file_id);
            }
            Ok(())
        }
    }

    /// Run [`Node::pull_file`] in the background
    pub(crate) fn spawn_pull(&self, file_id: &str) {
        let node = self.clone();
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            match node.pull_file(&file_id).await {
                Ok(path) => tracing::info!("Pulled {} to {}", file_id, path.display()),
                Err(e) => tracing::warn!("Pull of {} failed: {}", file_id, e),
            }
        });
    }
}

/// Received files must stay inside the output directory
fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || is_reserved_name(name)
    {
        return Err(NodeError::Protocol(
            format!("refusing file name {name:?}").into(),
        ));
    }
    Ok(())
}
