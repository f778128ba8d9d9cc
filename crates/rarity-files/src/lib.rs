//! # rarity Files
//!
//! Chunk codec for the rarity swarm.
//!
//! This crate provides:
//! - File chunking with configurable chunk size
//! - In-order reassembly with whole-file digest verification
//! - SHA-256 digests (hex encoded) for whole files and single chunks
//! - Detection of corrupted chunks against a reference digest list

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod hasher;

pub use chunker::{FileChunker, reassemble};
pub use error::{FilesError, Result};
pub use hasher::{chunk_digests, digest, digest_file, find_corrupted_chunks, verify_chunk};

/// Default chunk size (512 bytes)
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Length of a hex encoded digest (SHA-256, 32 bytes)
pub const DIGEST_HEX_LEN: usize = 64;
