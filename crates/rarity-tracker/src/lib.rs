//! # rarity Tracker
//!
//! Central swarm coordinator for rarity.
//!
//! The tracker keeps the swarm's shared bookkeeping: which peers exist, which
//! peer holds which chunk of which file, how often each chunk is replicated,
//! and which peer originally seeded the file. Peers query it for their rarest
//! missing chunk and report every chunk they obtain.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        │               Coordinator                     │
//!        │  registry │ torrents (1 lock / file) │ stats  │
//!        └──────────────────────┬───────────────────────┘
//!                               │ axum JSON/HTTP
//!           ┌───────────────────┼───────────────────┐
//!           ▼                   ▼                   ▼
//!     TrackerClient       TrackerClient       TrackerClient
//!       (peer A)            (peer B)            (seeder)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use rarity_tracker::{Coordinator, TrackerClient, api};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Arc::new(Coordinator::new());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:6969").await?;
//! tokio::spawn(api::serve(listener, coordinator));
//!
//! let client = TrackerClient::new("http://127.0.0.1:6969")?;
//! client.register(7000).await?;
//! let peers = client.peers(7000).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod torrent;
pub mod types;

pub use client::TrackerClient;
pub use coordinator::{Coordinator, CoordinatorConfig, Registration};
pub use error::{CoordinatorError, TrackerError};
pub use torrent::{MAX_TOTAL_CHUNKS, Torrent};
pub use types::{ChunkAssignment, ChunkMatrix, PeerCounters, PeerId, TorrentInfo, TransferStats};

/// Default tracker port
pub const DEFAULT_TRACKER_PORT: u16 = 6969;

/// HTTP client request timeout (30 seconds)
pub const TRACKER_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
