//! Peer node: listener, push/pull sessions, recovery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Node                              │
//! │  seed / push   │  pull / fetch   │  recover   │  stats    │
//! ├──────────────────────────────────────────────────────────┤
//! │  LocalFile store (one lock per file)  │  TrackerClient   │
//! ├──────────────────────────────────────────────────────────┤
//! │           PeerStream (framed TCP, timeouts)               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! One task accepts connections and one task runs per accepted connection.
//! Seeding runs one task per receiving peer.

pub mod config;
pub mod connection;
pub mod error;
mod inbound;
#[allow(clippy::module_inception)]
pub mod node;
pub mod pull;
pub mod recovery;
pub mod seed;

pub use config::{NodeConfig, TransferConfig};
pub use connection::PeerStream;
pub use error::{NodeError, Result};
pub use node::{FileHandle, Node};
pub use recovery::RecoveryReport;
pub use seed::{PeerOutcome, SeedEvent, SeedReport, block_ranges};
