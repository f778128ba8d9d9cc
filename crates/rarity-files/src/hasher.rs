//! SHA-256 content digests for file integrity.
//!
//! Digests cross the wire as plain lowercase hex text, so the same bytes must
//! produce the same string on every peer.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hash a byte slice and return the lowercase hex digest
#[must_use]
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file on disk without loading it whole
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn digest_file<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Per-chunk digests, in index order
#[must_use]
pub fn chunk_digests<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<String> {
    chunks.iter().map(|c| digest(c.as_ref())).collect()
}

/// Verify a chunk against its expected hex digest
#[must_use]
pub fn verify_chunk(data: &[u8], expected: &str) -> bool {
    digest(data).eq_ignore_ascii_case(expected)
}

/// Indices of local chunks whose digest differs from the reference list
///
/// A local chunk with no reference entry, or a reference entry with no local
/// chunk, counts as corrupted.
#[must_use]
pub fn find_corrupted_chunks<C: AsRef<[u8]>>(local: &[C], reference: &[String]) -> Vec<u32> {
    let len = local.len().max(reference.len());
    (0..len)
        .filter(|&i| match (local.get(i), reference.get(i)) {
            (Some(chunk), Some(expected)) => !verify_chunk(chunk.as_ref(), expected),
            _ => true,
        })
        .map(|i| i as u32)
        .collect()
}
