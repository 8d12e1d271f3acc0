use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ShieldError};

/// Well-known DNS port
pub const DNS_PORT: u16 = 53;

/// Number of samples kept in the recent-sources ring
pub const DEFAULT_WINDOW_SIZE: usize = 16;

/// Occurrences per epoch above which a source is blocked
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Aggregation interval in milliseconds
pub const DEFAULT_EPOCH_MS: u64 = 1000;

/// Largest accepted ring buffer
pub const MAX_WINDOW_SIZE: usize = 1 << 20;

/// Largest reply queue the tokio channel can be created with
pub const MAX_REPLY_QUEUE_DEPTH: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Shield configuration
///
/// Every field has a default matching the fixed constants of the engine, so an
/// empty TOML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Ring buffer capacity (samples)
    pub window_size: usize,
    /// Per-epoch count that must be exceeded to block a source
    pub threshold: u32,
    /// Aggregation interval in milliseconds
    pub epoch_ms: u64,
    /// UDP destination port treated as DNS
    pub dns_port: u16,
    /// TTL written into synthetic replies
    pub reply_ttl: u8,
    /// Upper bound on distinct sources materialized per epoch
    pub max_ledger_entries: usize,
    /// Upper bound on blocked sources
    pub max_blocklist_entries: usize,
    /// Outbound reply queue capacity
    pub reply_queue_depth: usize,
    /// Wipe the ring after each drain (strict per-epoch counting).
    /// Off by default: the ring is a sliding window over recorded events.
    pub clear_window_on_drain: bool,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            threshold: DEFAULT_THRESHOLD,
            epoch_ms: DEFAULT_EPOCH_MS,
            dns_port: DNS_PORT,
            reply_ttl: 64,
            max_ledger_entries: 65_536,
            max_blocklist_entries: 65_536,
            reply_queue_depth: 1024,
            clear_window_on_drain: false,
        }
    }
}

impl ShieldConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: ShieldConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(&self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Aggregation interval
    pub fn epoch(&self) -> Duration {
        Duration::from_millis(self.epoch_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(ShieldError::Config("window_size must be > 0".to_string()));
        }

        if self.window_size > MAX_WINDOW_SIZE {
            return Err(ShieldError::Config(format!(
                "window_size must be <= {}",
                MAX_WINDOW_SIZE
            )));
        }

        // A source can never exceed a threshold the window cannot hold
        if usize::try_from(self.threshold).map_or(true, |t| t >= self.window_size) {
            return Err(ShieldError::Config(
                "threshold must be < window_size".to_string(),
            ));
        }

        if self.epoch_ms == 0 {
            return Err(ShieldError::Config("epoch_ms must be > 0".to_string()));
        }

        if self.dns_port == 0 {
            return Err(ShieldError::Config("dns_port cannot be 0".to_string()));
        }

        if self.reply_ttl == 0 {
            return Err(ShieldError::Config("reply_ttl must be > 0".to_string()));
        }

        if self.max_ledger_entries == 0 {
            return Err(ShieldError::Config(
                "max_ledger_entries must be > 0".to_string(),
            ));
        }

        if self.max_blocklist_entries == 0 {
            return Err(ShieldError::Config(
                "max_blocklist_entries must be > 0".to_string(),
            ));
        }

        if self.reply_queue_depth == 0 {
            return Err(ShieldError::Config(
                "reply_queue_depth must be > 0".to_string(),
            ));
        }

        if self.reply_queue_depth > MAX_REPLY_QUEUE_DEPTH {
            return Err(ShieldError::Config(format!(
                "reply_queue_depth must be <= {}",
                MAX_REPLY_QUEUE_DEPTH
            )));
        }

        Ok(())
    }
}
