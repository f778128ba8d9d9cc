//! Swarm fixture: one tracker, one seeder and N receiving peers on loopback
//!
//! # Example
//!
//! ```no_run
//! use rarity_integration_tests::SwarmFixture;
//!
//! # async fn example() -> rarity_core::node::Result<()> {
//! let swarm = SwarmFixture::new(2).await?;
//! let path = swarm.write_file("sample.bin", 5000);
//! let report = swarm.seeder.seed_file(&path).await?;
//! let outputs = swarm.wait_all(&report.file_id).await?;
//! # Ok(())
//! # }
//! ```

use rarity_core::node::{NodeError, Result};
use rarity_core::{Node, NodeConfig, TransferConfig};
use rarity_tracker::{Coordinator, TrackerClient, api};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How long [`SwarmFixture::wait_all`] waits for the swarm to converge
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deterministic file content of `size` bytes
#[must_use]
pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 251) as u8).collect()
}

/// A tracker, a seeder and `N` peers, each node with its own output directory
pub struct SwarmFixture {
    /// In-process coordinator behind the HTTP API
    pub coordinator: Arc<Coordinator>,
    /// Client for inspecting the tracker
    pub tracker: TrackerClient,
    /// Seeding node
    pub seeder: Node,
    /// Receiving peers, in registration order
    pub peers: Vec<Node>,
    server: JoinHandle<std::io::Result<()>>,
    dir: TempDir,
}

impl SwarmFixture {
    /// Start a swarm with default transfer settings
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound or a node fails to start.
    pub async fn new(peer_count: usize) -> Result<Self> {
        Self::with_transfer(peer_count, TransferConfig::default()).await
    }

    /// Start a swarm with custom transfer settings for every node
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound or a node fails to start.
    pub async fn with_transfer(peer_count: usize, transfer: TransferConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;

        let coordinator = Arc::new(Coordinator::new());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let server = tokio::spawn(api::serve(listener, Arc::clone(&coordinator)));
        let tracker = TrackerClient::new(&url)?;

        let mut peers = Vec::with_capacity(peer_count);
        for i in 0..peer_count {
            let node = start_node(&url, &dir.path().join(format!("peer-{i}")), &transfer).await?;
            peers.push(node);
        }
        let seeder = start_node(&url, &dir.path().join("seeder"), &transfer).await?;

        Ok(Self {
            coordinator,
            tracker,
            seeder,
            peers,
            server,
            dir,
        })
    }

    /// Scratch directory shared by the swarm
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Tracker base URL
    #[must_use]
    pub fn tracker_url(&self) -> &str {
        self.tracker.url()
    }

    /// Write `size` bytes of [`pattern`] content into the scratch directory
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn write_file(&self, name: &str, size: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, pattern(size)).expect("write fixture file");
        path
    }

    /// Start an extra node attached to the same tracker
    ///
    /// # Errors
    ///
    /// Returns an error if the node fails to start.
    pub async fn spawn_node(&self, name: &str) -> Result<Node> {
        start_node(
            self.tracker.url(),
            &self.dir.path().join(name),
            &TransferConfig::default(),
        )
        .await
    }

    /// Register a peer id whose port nothing listens on
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker cannot be reached.
    pub async fn register_dead_peer(&self) -> Result<u16> {
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").await?;
            probe.local_addr()?.port()
        };
        self.tracker.register(port).await?;
        Ok(port)
    }

    /// Wait until every peer has written and verified `file_id`
    ///
    /// # Errors
    ///
    /// Returns an error if a peer's transfer fails or the swarm does not
    /// converge in time.
    pub async fn wait_all(&self, file_id: &str) -> Result<Vec<PathBuf>> {
        let wait = async {
            let mut outputs = Vec::with_capacity(self.peers.len());
            for peer in &self.peers {
                outputs.push(peer.wait_for_file(file_id).await?);
            }
            Ok::<_, NodeError>(outputs)
        };

        tokio::time::timeout(CONVERGE_TIMEOUT, wait)
            .await
            .map_err(|_| NodeError::timeout("swarm did not converge"))?
    }

    /// Stop every node and the tracker
    pub async fn shutdown(self) {
        for node in self.peers.iter().chain(std::iter::once(&self.seeder)) {
            if let Err(e) = node.stop().await {
                tracing::debug!("stop: {}", e);
            }
        }
        self.server.abort();
    }
}

async fn start_node(
    tracker_url: &str,
    output_dir: &Path,
    transfer: &TransferConfig,
) -> Result<Node> {
    let node = Node::new(NodeConfig {
        listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        output_dir: output_dir.to_path_buf(),
        tracker_url: Some(tracker_url.to_string()),
        transfer: transfer.clone(),
    })?;
    node.start().await?;
    Ok(node)
}
