//! Node implementation - peer lifecycle and shared state
//!
//! A [`Node`] is one swarm peer: it listens for other peers, keeps the
//! chunks it holds per file, talks to the tracker, and counts what it
//! transfers. `Node` is a cheap handle; clones share one `NodeInner`.
//!
//! # Example
//!
//! ```no_run
//! use rarity_core::node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig {
//!         tracker_url: Some("http://127.0.0.1:6969".into()),
//!         ..NodeConfig::default()
//!     };
//!     let node = Node::new(config)?;
//!     node.start().await?;
//!
//!     let report = node.seed_file("notes.txt").await?;
//!     println!("seeded {} chunks", report.total_chunks);
//!     Ok(())
//! }
//! ```

use super::config::NodeConfig;
use super::connection::PeerStream;
use super::error::{NodeError, Result};
use crate::stats::PeerStats;
use crate::store::{FileState, LocalFile};
use dashmap::DashMap;
use rarity_files::{FileChunker, digest_file};
use rarity_tracker::{MAX_TOTAL_CHUNKS, PeerId, Registration, TrackerClient, TransferStats};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Shared handle to one file's chunk state
pub type FileHandle = Arc<Mutex<LocalFile>>;

/// Node inner state
pub(crate) struct NodeInner {
    /// Node configuration
    pub(crate) config: NodeConfig,
    /// Files this peer holds chunks of (file_id -> state)
    pub(crate) files: DashMap<String, FileHandle>,
    /// Local transfer counters
    pub(crate) stats: PeerStats,
    /// Tracker client, when configured
    pub(crate) tracker: Option<TrackerClient>,
    /// Node running state
    pub(crate) running: AtomicBool,
    /// Bound listening address
    pub(crate) local_addr: RwLock<Option<SocketAddr>>,
    /// Accept loop task
    pub(crate) acceptor: Mutex<Option<JoinHandle<()>>>,
}

/// A swarm peer
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Create a node
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let tracker = config
            .tracker_url
            .as_deref()
            .map(TrackerClient::new)
            .transpose()
            .map_err(|e| NodeError::InvalidConfig(e.to_string().into()))?;

        let inner = NodeInner {
            config,
            files: DashMap::new(),
            stats: PeerStats::new(),
            tracker,
            running: AtomicBool::new(false),
            local_addr: RwLock::new(None),
            acceptor: Mutex::new(None),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Node configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle Methods
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Start listening and register with the tracker
    ///
    /// # Errors
    ///
    /// Returns an error if the node is already running, the listener cannot
    /// be bound, or the tracker refuses the registration.
    pub async fn start(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("Node already running"));
        }

        match self.bind_and_register().await {
            Ok(listener) => {
                let node = self.clone();
                let handle = tokio::spawn(async move {
                    node.accept_loop(listener).await;
                });
                *self.inner.acceptor.lock().await = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                *self.inner.local_addr.write().await = None;
                Err(e)
            }
        }
    }

    async fn bind_and_register(&self) -> Result<TcpListener> {
        let config = &self.inner.config;

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| {
                NodeError::Connectivity(format!("bind {}: {e}", config.listen_addr).into())
            })?;

        let mut addr = listener.local_addr()?;
        if addr.ip().is_unspecified() {
            let loopback = if addr.is_ipv4() {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                IpAddr::V6(Ipv6Addr::LOCALHOST)
            };
            addr.set_ip(loopback);
        }
        *self.inner.local_addr.write().await = Some(addr);

        tokio::fs::create_dir_all(&config.output_dir).await?;

        if let Some(tracker) = &self.inner.tracker {
            match tracker.register(addr.port()).await? {
                Registration::Registered => {
                    tracing::info!("Registered with tracker {}", tracker.url());
                }
                Registration::AlreadyRegistered => {
                    tracing::debug!("Already registered with tracker {}", tracker.url());
                }
            }
        }

        tracing::info!("Node listening on {}", addr);
        Ok(listener)
    }

    async fn accept_loop(&self, listener: TcpListener) {
        while self.is_running() {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted connection from {}", peer);
                    self.inner.stats.connection_succeeded();

                    let stream = PeerStream::accepted(stream, peer, self.inner.config.transfer.io_timeout);
                    let node = self.clone();
                    tokio::spawn(async move {
                        node.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    self.inner.stats.connection_failed();
                    // Back off on fd exhaustion instead of spinning
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    /// Stop accepting connections
    ///
    /// Sessions already in progress run to completion. Held chunks stay
    /// available until the node is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not running.
    pub async fn stop(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("Node not running"));
        }

        if let Some(handle) = self.inner.acceptor.lock().await.take() {
            handle.abort();
        }

        tracing::info!("Node stopped");
        Ok(())
    }

    /// Returns true while the node accepts connections
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Bound address as seen from this host
    ///
    /// A wildcard bind (`0.0.0.0` or `::`) is reported as loopback.
    ///
    /// # Errors
    ///
    /// Returns an error if the node has not been started.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        self.inner
            .local_addr
            .read()
            .await
            .ok_or_else(|| NodeError::invalid_state("Node not started"))
    }

    /// Listening port
    ///
    /// # Errors
    ///
    /// Returns an error if the node has not been started.
    pub async fn port(&self) -> Result<u16> {
        Ok(self.local_addr().await?.port())
    }

    /// Local view of the swarm identity, `"<host>:<port>"`
    ///
    /// The tracker keys peers by the source IP it sees, so on a wildcard
    /// bind this matches the tracker's id only for loopback swarms.
    ///
    /// # Errors
    ///
    /// Returns an error if the node has not been started.
    pub async fn peer_id(&self) -> Result<PeerId> {
        let addr = self.local_addr().await?;
        Ok(rarity_tracker::types::peer_id(addr.ip(), addr.port()))
    }

    pub(crate) fn tracker(&self) -> Result<&TrackerClient> {
        self.inner
            .tracker
            .as_ref()
            .ok_or_else(|| NodeError::invalid_state("No tracker configured"))
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(NodeError::invalid_state("Node not running"))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Local Files
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Handle to a file's chunk state
    #[must_use]
    pub fn local_file(&self, file_id: &str) -> Option<FileHandle> {
        self.inner.files.get(file_id).map(|f| Arc::clone(f.value()))
    }

    /// Identifiers of every file this node tracks
    #[must_use]
    pub fn file_ids(&self) -> Vec<String> {
        self.inner.files.iter().map(|e| e.key().clone()).collect()
    }

    /// Get or create the record for `file_id`
    ///
    /// An existing record is reused as is. Its chunk count must match.
    /// Counts above [`MAX_TOTAL_CHUNKS`] are refused before anything is
    /// allocated.
    pub(crate) async fn ensure_file(&self, file_id: &str, total_chunks: u32) -> Result<FileHandle> {
        if total_chunks > MAX_TOTAL_CHUNKS {
            return Err(NodeError::Protocol(
                format!("{file_id} announces {total_chunks} chunks, limit is {MAX_TOTAL_CHUNKS}")
                    .into(),
            ));
        }

        let handle = Arc::clone(
            self.inner
                .files
                .entry(file_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(LocalFile::new(file_id, total_chunks))))
                .value(),
        );

        let existing = handle.lock().await.total_chunks();
        if existing != total_chunks {
            return Err(NodeError::Protocol(
                format!("{file_id} has {existing} chunks locally, peer announced {total_chunks}")
                    .into(),
            ));
        }
        Ok(handle)
    }

    /// Load a complete local file so this node can serve it
    ///
    /// The file is split with the configured chunk size and its digest
    /// recorded. Returns the file identifier (its base name).
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no file name or cannot be read.
    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref().to_path_buf();
        let file_id = file_id_for(&path)?;
        let chunk_size = self.inner.config.transfer.chunk_size;

        let (chunks, digest) = tokio::task::spawn_blocking({
            let path = path.clone();
            move || -> Result<_> {
                let chunks = FileChunker::with_chunk_size(chunk_size).split_file(&path)?;
                let digest = digest_file(&path)?;
                Ok((chunks, digest))
            }
        })
        .await??;

        tracing::info!(
            "Imported {} ({} chunks, digest {})",
            file_id,
            chunks.len(),
            &digest[..16.min(digest.len())]
        );

        let record = LocalFile::complete(file_id.clone(), chunks, digest, path);
        if self
            .inner
            .files
            .insert(file_id.clone(), Arc::new(Mutex::new(record)))
            .is_some()
        {
            tracing::warn!("Replaced existing local state for {}", file_id);
        }
        Ok(file_id)
    }

    /// Wait until `file_id` is written and verified
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unknown or its transfer failed.
    pub async fn wait_for_file(&self, file_id: &str) -> Result<PathBuf> {
        loop {
            let handle = self
                .local_file(file_id)
                .ok_or_else(|| NodeError::FileNotFound(file_id.to_string()))?;
            {
                let file = handle.lock().await;
                match file.state() {
                    FileState::Complete => {
                        return file
                            .output_path()
                            .cloned()
                            .ok_or_else(|| NodeError::invalid_state("Complete file has no path"));
                    }
                    FileState::Failed(reason) if !file.is_pulling() => {
                        return Err(NodeError::InvalidState(
                            format!("{file_id} failed: {reason}").into(),
                        ));
                    }
                    _ => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Snapshot of local transfer counters
    #[must_use]
    pub fn stats(&self) -> TransferStats {
        self.inner.stats.snapshot()
    }

    /// Send local counters to the tracker
    ///
    /// # Errors
    ///
    /// Returns an error if no tracker is configured or the report fails.
    pub async fn report_stats(&self) -> Result<()> {
        let port = self.port().await?;
        self.tracker()?.report_stats(port, self.stats()).await?;
        Ok(())
    }
}

/// Base name of `path`, used as the swarm-wide file identifier
pub(crate) fn file_id_for(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| NodeError::FileNotFound(path.display().to_string()))
}
