//! Per-file local chunk state.

use std::path::PathBuf;

/// Lifecycle of a locally tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Chunks are still arriving
    Receiving,
    /// All chunks held, written out and verified
    Complete,
    /// Reassembly or pulling gave up
    Failed(String),
}

/// Chunks of one file held by this peer
///
/// Partially received chunks are never discarded on a failed session, so a
/// later push or pull can fill the remaining gaps.
#[derive(Debug)]
pub struct LocalFile {
    file_id: String,
    total_chunks: u32,
    chunks: Vec<Option<Vec<u8>>>,
    held: u32,
    digest: Option<String>,
    state: FileState,
    output_path: Option<PathBuf>,
    pulling: bool,
}

impl LocalFile {
    /// Empty record expecting `total_chunks` chunks
    #[must_use]
    pub fn new(file_id: impl Into<String>, total_chunks: u32) -> Self {
        Self {
            file_id: file_id.into(),
            total_chunks,
            chunks: vec![None; total_chunks as usize],
            held: 0,
            digest: None,
            state: FileState::Receiving,
            output_path: None,
            pulling: false,
        }
    }

    /// Record for a file this peer already holds in full
    #[must_use]
    pub fn complete(
        file_id: impl Into<String>,
        chunks: Vec<Vec<u8>>,
        digest: String,
        path: PathBuf,
    ) -> Self {
        let total_chunks = chunks.len() as u32;
        Self {
            file_id: file_id.into(),
            total_chunks,
            chunks: chunks.into_iter().map(Some).collect(),
            held: total_chunks,
            digest: Some(digest),
            state: FileState::Complete,
            output_path: Some(path),
            pulling: false,
        }
    }

    /// File identifier
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Chunks in the whole file
    #[must_use]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Store a chunk
    ///
    /// Returns `true` if the chunk was not held before. Out-of-range indices
    /// are ignored and return `false`.
    pub fn store(&mut self, index: u32, data: Vec<u8>) -> bool {
        let Some(slot) = self.chunks.get_mut(index as usize) else {
            return false;
        };
        let new = slot.is_none();
        *slot = Some(data);
        if new {
            self.held += 1;
        }
        new
    }

    /// Overwrite a chunk that is already held
    pub fn replace(&mut self, index: u32, data: Vec<u8>) {
        self.store(index, data);
    }

    /// Bytes of a held chunk
    #[must_use]
    pub fn chunk(&self, index: u32) -> Option<&[u8]> {
        self.chunks.get(index as usize)?.as_deref()
    }

    /// Returns true if `index` is held
    #[must_use]
    pub fn has_chunk(&self, index: u32) -> bool {
        self.chunk(index).is_some()
    }

    /// Possession flags, one per chunk
    #[must_use]
    pub fn bitfield(&self) -> Vec<bool> {
        self.chunks.iter().map(Option::is_some).collect()
    }

    /// Indices not yet held
    #[must_use]
    pub fn missing_chunks(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Number of chunks held
    #[must_use]
    pub fn held_count(&self) -> u32 {
        self.held
    }

    /// Returns true once every chunk is held
    #[must_use]
    pub fn has_all_chunks(&self) -> bool {
        self.held == self.total_chunks
    }

    /// Fraction of chunks held (0.0 to 1.0)
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        f64::from(self.held) / f64::from(self.total_chunks)
    }

    /// All chunks in index order, if complete
    #[must_use]
    pub fn ordered_chunks(&self) -> Option<Vec<&[u8]>> {
        self.chunks.iter().map(Option::as_deref).collect()
    }

    /// Expected whole-file digest
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Set the expected whole-file digest
    pub fn set_digest(&mut self, digest: String) {
        self.digest = Some(digest);
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &FileState {
        &self.state
    }

    /// Returns true once written and verified
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == FileState::Complete
    }

    /// Mark written and verified at `path`
    pub fn mark_complete(&mut self, path: PathBuf) {
        self.state = FileState::Complete;
        self.output_path = Some(path);
    }

    /// Mark failed
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = FileState::Failed(reason.into());
    }

    /// Location of the verified file
    #[must_use]
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    /// Claim the pull loop for this file
    ///
    /// Returns `false` if a pull is already running.
    pub fn begin_pull(&mut self) -> bool {
        if self.pulling {
            return false;
        }
        self.pulling = true;
        if matches!(self.state, FileState::Failed(_)) {
            self.state = FileState::Receiving;
        }
        true
    }

    /// Claim the right to write out a fully held file
    ///
    /// Shares the pull claim, so at most one session reassembles a file at
    /// a time. Returns `false` unless every chunk is held, the file is not
    /// yet complete and nobody else holds the claim.
    pub fn begin_finalize(&mut self) -> bool {
        self.has_all_chunks() && !self.is_complete() && self.begin_pull()
    }

    /// Release the pull loop claim
    pub fn end_pull(&mut self) {
        self.pulling = false;
    }

    /// Returns true while a pull loop runs
    #[must_use]
    pub fn is_pulling(&self) -> bool {
        self.pulling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_missing() {
        let mut file = LocalFile::new("a.bin", 4);
        assert_eq!(file.missing_chunks(), vec![0, 1, 2, 3]);

        assert!(file.store(2, vec![1, 2]));
        assert!(!file.store(2, vec![1, 2]));
        assert!(!file.store(9, vec![0]));

        assert_eq!(file.held_count(), 1);
        assert_eq!(file.bitfield(), vec![false, false, true, false]);
        assert_eq!(file.missing_chunks(), vec![0, 1, 3]);
        assert!(!file.has_all_chunks());
        assert!((file.progress() - 0.25).abs() < f64::EPSILON);
        assert!(file.ordered_chunks().is_none());
    }

    #[test]
    fn test_all_chunks_ordered() {
        let mut file = LocalFile::new("a.bin", 2);
        file.store(1, vec![2]);
        file.store(0, vec![1]);
        assert!(file.has_all_chunks());
        assert_eq!(file.ordered_chunks().unwrap(), vec![&[1u8][..], &[2u8][..]]);
        // Holding every chunk is not the same as verified
        assert!(!file.is_complete());
    }

    #[test]
    fn test_replace_keeps_count() {
        let mut file = LocalFile::new("a.bin", 1);
        file.store(0, vec![0xFF]);
        file.replace(0, vec![0x00]);
        assert_eq!(file.held_count(), 1);
        assert_eq!(file.chunk(0), Some(&[0x00][..]));
    }

    #[test]
    fn test_single_pull_claim() {
        let mut file = LocalFile::new("a.bin", 1);
        assert!(file.begin_pull());
        assert!(!file.begin_pull());
        file.end_pull();
        assert!(file.begin_pull());
    }

    #[test]
    fn test_single_finalize_claim() {
        let mut file = LocalFile::new("a.bin", 2);
        file.store(0, vec![1]);
        assert!(!file.begin_finalize());

        file.store(1, vec![2]);
        assert!(file.begin_finalize());
        assert!(!file.begin_finalize());
        assert!(!file.begin_pull());

        file.end_pull();
        file.mark_complete(PathBuf::from("/tmp/a.bin"));
        assert!(!file.begin_finalize());
    }

    #[test]
    fn test_complete_record() {
        let file = LocalFile::complete(
            "a.bin",
            vec![vec![1], vec![2]],
            "ab".into(),
            PathBuf::from("/tmp/a.bin"),
        );
        assert!(file.is_complete());
        assert_eq!(file.total_chunks(), 2);
        assert!(file.missing_chunks().is_empty());
        assert_eq!(file.digest(), Some("ab"));
    }
}
