//! Node configuration

use super::error::{NodeError, Result};
use rarity_files::DEFAULT_CHUNK_SIZE;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Largest chunk a single frame can carry with room for its header
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024 - 16;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen address for incoming peer connections (port 0 picks one)
    pub listen_addr: SocketAddr,

    /// Directory received files are written to
    pub output_dir: PathBuf,

    /// Tracker base URL; without it the node only serves pushes and fetches
    pub tracker_url: Option<String>,

    /// Transfer configuration
    pub transfer: TransferConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            output_dir: PathBuf::from("received_files"),
            tracker_url: None,
            transfer: TransferConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.tracker_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(NodeError::InvalidConfig(
                    format!("tracker url must be http(s): {url}").into(),
                ));
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(NodeError::InvalidConfig("output_dir is empty".into()));
        }
        self.transfer.validate()
    }
}

/// Transfer configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes per chunk when seeding
    pub chunk_size: usize,

    /// Timeout for establishing a peer connection
    pub connect_timeout: Duration,

    /// Timeout for each frame read or write
    pub io_timeout: Duration,

    /// Recovery rounds before an integrity failure is final
    pub max_recovery_attempts: u32,

    /// Consecutive failed fetches before a pull gives up
    pub max_fetch_failures: u32,

    /// Wait between tracker polls while a torrent is not yet initialized
    pub tracker_retry_interval: Duration,

    /// Tracker polls before giving up on an uninitialized torrent
    pub tracker_retry_attempts: u32,

    /// Start pulling automatically after an incomplete push
    pub auto_pull: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            max_recovery_attempts: 3,
            max_fetch_failures: 16,
            tracker_retry_interval: Duration::from_millis(250),
            tracker_retry_attempts: 40,
            auto_pull: true,
        }
    }
}

impl TransferConfig {
    /// Validate transfer settings
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(NodeError::InvalidConfig(
                format!("chunk_size must be 1..={MAX_CHUNK_SIZE}, got {}", self.chunk_size).into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.io_timeout.is_zero() {
            return Err(NodeError::InvalidConfig("timeouts must be non-zero".into()));
        }
        if self.max_recovery_attempts == 0 {
            return Err(NodeError::InvalidConfig(
                "max_recovery_attempts must be at least 1".into(),
            ));
        }
        if self.max_fetch_failures == 0 {
            return Err(NodeError::InvalidConfig(
                "max_fetch_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.chunk_size, 512);
        assert_eq!(config.transfer.max_recovery_attempts, 3);
        assert!(config.transfer.auto_pull);
    }

    #[test]
    fn test_rejects_bad_tracker_url() {
        let config = NodeConfig {
            tracker_url: Some("tracker:6969".into()),
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(NodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let mut config = NodeConfig::default();
        config.transfer.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_recovery() {
        let mut config = NodeConfig::default();
        config.transfer.max_recovery_attempts = 0;
        assert!(config.validate().is_err());
    }
}
