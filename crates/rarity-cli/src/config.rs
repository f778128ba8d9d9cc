//! Configuration file for the rarity CLI.

use rarity_core::node::config::MAX_CHUNK_SIZE;
use rarity_core::{NodeConfig, TransferConfig};
use rarity_tracker::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// rarity configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Tracker configuration
    #[serde(default)]
    pub tracker: TrackerSection,
    /// Peer node configuration
    #[serde(default)]
    pub node: NodeSection,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    /// Address `rarity tracker` binds to
    #[serde(default = "default_tracker_bind")]
    pub bind_addr: String,
    /// Tracker base URL used by peers
    #[serde(default = "default_tracker_url")]
    pub url: String,
}

/// Peer node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Listen address for peer connections
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Directory received files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSection {
    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-frame read/write timeout in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
    /// Recovery rounds per file
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    /// Consecutive failed fetches before a pull gives up
    #[serde(default = "default_max_fetch_failures")]
    pub max_fetch_failures: u32,
    /// Pull the rest of a file after a partial push
    #[serde(default = "default_true")]
    pub auto_pull: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_tracker_bind() -> String {
    format!("0.0.0.0:{}", rarity_tracker::DEFAULT_TRACKER_PORT)
}

fn default_tracker_url() -> String {
    format!("http://127.0.0.1:{}", rarity_tracker::DEFAULT_TRACKER_PORT)
}

fn default_listen_addr() -> String {
    "0.0.0.0:0".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("received_files")
}

fn default_chunk_size() -> usize {
    rarity_files::DEFAULT_CHUNK_SIZE
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_io_timeout() -> u64 {
    30
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_max_fetch_failures() -> u32 {
    16
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_tracker_bind(),
            url: default_tracker_url(),
        }
    }
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            max_recovery_attempts: default_max_recovery_attempts(),
            max_fetch_failures: default_max_fetch_failures(),
            auto_pull: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("rarity/config.toml")
    }

    /// Load `path`, or the default path if it exists, or built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file cannot be loaded.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tracker.bind_addr.parse::<SocketAddr>().map_err(|e| {
            anyhow::anyhow!("Invalid tracker bind address {}: {e}", self.tracker.bind_addr)
        })?;
        self.node.listen_addr.parse::<SocketAddr>().map_err(|e| {
            anyhow::anyhow!("Invalid listen address {}: {e}", self.node.listen_addr)
        })?;

        let host_port = self
            .tracker
            .url
            .strip_prefix("http://")
            .or_else(|| self.tracker.url.strip_prefix("https://"))
            .ok_or_else(|| anyhow::anyhow!("Tracker URL must be http(s): {}", self.tracker.url))?;
        validate_host_port(host_port.trim_end_matches('/'), "Tracker URL")?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("Chunk size must be between 1 byte and 16MB");
        }

        Ok(())
    }

    /// Build the tracker configuration, applying a command-line override
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address does not parse.
    pub fn to_coordinator_config(
        &self,
        bind_addr: Option<&str>,
    ) -> anyhow::Result<CoordinatorConfig> {
        let bind_addr = bind_addr.unwrap_or(&self.tracker.bind_addr);
        Ok(CoordinatorConfig {
            bind_addr: bind_addr
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid tracker bind address {bind_addr}: {e}"))?,
        })
    }

    /// Build a node configuration, applying command-line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address does not parse.
    pub fn to_node_config(
        &self,
        listen_addr: Option<&str>,
        tracker_url: Option<&str>,
        output_dir: Option<&Path>,
    ) -> anyhow::Result<NodeConfig> {
        let listen_addr = listen_addr.unwrap_or(&self.node.listen_addr).parse()?;
        let config = NodeConfig {
            listen_addr,
            output_dir: output_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.node.output_dir.clone()),
            tracker_url: Some(tracker_url.unwrap_or(&self.tracker.url).to_string()),
            transfer: TransferConfig {
                chunk_size: self.transfer.chunk_size,
                connect_timeout: Duration::from_secs(self.transfer.connect_timeout_secs),
                io_timeout: Duration::from_secs(self.transfer.io_timeout_secs),
                max_recovery_attempts: self.transfer.max_recovery_attempts,
                max_fetch_failures: self.transfer.max_fetch_failures,
                auto_pull: self.transfer.auto_pull,
                ..TransferConfig::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validate host:port format
fn validate_host_port(addr: &str, name: &str) -> anyhow::Result<()> {
    let Some((host, port_str)) = addr.rsplit_once(':') else {
        anyhow::bail!("{name} '{addr}' missing port (expected format: host:port)");
    };

    let port: u16 = port_str
        .parse()
        .map_err(|_| anyhow::anyhow!("{name} '{addr}' has invalid port: {port_str}"))?;
    if port == 0 {
        anyhow::bail!("{name} '{addr}' has invalid port: 0");
    }

    if host.is_empty() {
        anyhow::bail!("{name} '{addr}' has empty hostname");
    }
    if host.contains("..") || host.contains('/') || host.contains('\\') {
        anyhow::bail!("{name} '{addr}' contains invalid characters");
    }

    Ok(())
}
