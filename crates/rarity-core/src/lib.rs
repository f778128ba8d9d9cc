//! # rarity Core
//!
//! Peer transfer engine for rarity.
//!
//! This crate provides:
//! - Length-prefixed framing for every peer message
//! - Per-file chunk state shared by concurrent sessions
//! - The [`Node`](node::Node): push sessions to seed a file, rarest-first
//!   pulls driven by the tracker, and bounded corruption recovery
//! - Local transfer counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Node                                   │
//! │   (sessions with other peers, requests to the tracker)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         LocalFile                                │
//! │   (chunks and bitfield per file)                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Frames                                  │
//! │   (Text / Chunk / Data over TCP)                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod node;
pub mod stats;
pub mod store;

pub use error::FrameError;
pub use frame::{Command, Frame, FrameKind, PushHeader};
pub use node::{
    Node, NodeConfig, NodeError, PeerOutcome, RecoveryReport, SeedEvent, SeedReport,
    TransferConfig,
};
pub use stats::PeerStats;
pub use store::{FileState, LocalFile};
