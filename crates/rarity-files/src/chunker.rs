//! File chunking and reassembly.

use crate::DEFAULT_CHUNK_SIZE;
use crate::error::{FilesError, Result};
use crate::hasher::digest_file;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Chunk a file into fixed-size pieces
///
/// Every chunk is `chunk_size` bytes except the last, which may be shorter.
/// An empty input produces no chunks.
#[derive(Debug, Clone, Copy)]
pub struct FileChunker {
    chunk_size: usize,
}

impl FileChunker {
    /// Create a new chunker with default chunk size
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new chunker with custom chunk size
    pub fn with_chunk_size(size: usize) -> Self {
        Self { chunk_size: size }
    }

    /// Get chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Calculate number of chunks for a file
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        file_size.div_ceil(self.chunk_size as u64)
    }

    /// Split an in-memory buffer into chunks
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::ZeroChunkSize`] if the chunk size is zero.
    pub fn split_bytes(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        if self.chunk_size == 0 {
            return Err(FilesError::ZeroChunkSize);
        }
        Ok(data.chunks(self.chunk_size).map(<[u8]>::to_vec).collect())
    }

    /// Read a file in fixed-size blocks, in order
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk size is zero or the file cannot be read.
    pub fn split_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Vec<u8>>> {
        if self.chunk_size == 0 {
            return Err(FilesError::ZeroChunkSize);
        }

        let mut file = File::open(path)?;
        let expected = self.chunk_count(file.metadata()?.len());
        let mut chunks = Vec::with_capacity(expected as usize);

        loop {
            let mut chunk = vec![0u8; self.chunk_size];
            let mut filled = 0;

            // read() may return short counts before EOF
            while filled < self.chunk_size {
                let n = file.read(&mut chunk[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                break;
            }
            chunk.truncate(filled);
            let last = filled < self.chunk_size;
            chunks.push(chunk);
            if last {
                break;
            }
        }

        tracing::trace!("Split file into {} chunks of {} bytes", chunks.len(), self.chunk_size);
        Ok(chunks)
    }
}

impl Default for FileChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Write chunks in index order to `output` and verify the written file
///
/// A digest mismatch is returned as [`FilesError::DigestMismatch`] so the
/// caller can attempt corruption recovery; the written file is left in place.
///
/// # Errors
///
/// Returns an error if the output cannot be written or the digest differs.
pub fn reassemble<C, P>(chunks: &[C], output: P, expected_digest: &str) -> Result<()>
where
    C: AsRef<[u8]>,
    P: AsRef<Path>,
{
    let output = output.as_ref();
    {
        let mut writer = BufWriter::new(File::create(output)?);
        for chunk in chunks {
            writer.write_all(chunk.as_ref())?;
        }
        writer.flush()?;
    }

    let actual = digest_file(output)?;
    if !actual.eq_ignore_ascii_case(expected_digest) {
        tracing::debug!(
            "Reassembled {} does not match expected digest",
            output.display()
        );
        return Err(FilesError::DigestMismatch {
            expected: expected_digest.to_string(),
            actual,
        });
    }

    Ok(())
}
