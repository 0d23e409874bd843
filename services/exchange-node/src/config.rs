//! Node configuration
//!
//! A JSON file with every field optional. The path comes from the first
//! command-line argument or `EXCHANGE_CONFIG`; without either the defaults
//! are used. `EXCHANGE_DATA_DIR` overrides `data_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use market_data::{OrderBookConfig, TickerConfig};
use matching_engine::EngineConfig;
use persistence::{FlushPolicy, FsyncPolicy, JournalConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::ProductId;

pub const CONFIG_ENV: &str = "EXCHANGE_CONFIG";
pub const DATA_DIR_ENV: &str = "EXCHANGE_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Journals and snapshot files under `data_dir`
    File,
    /// Process-local, lost on exit
    Memory,
}

/// When journal appends reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncMode {
    EveryWrite,
    EveryN(usize),
    OnRotation,
}

impl From<FsyncMode> for FsyncPolicy {
    fn from(mode: FsyncMode) -> Self {
        match mode {
            FsyncMode::EveryWrite => FsyncPolicy::EveryWrite,
            FsyncMode::EveryN(n) => FsyncPolicy::EveryN(n.max(1)),
            FsyncMode::OnRotation => FsyncPolicy::OnRotation,
        }
    }
}

/// Where the product list comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrySource {
    /// Fixed list
    Static(Vec<ProductId>),
    /// JSON file re-read on every poll
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub fsync: FsyncMode,
    pub max_segment_bytes: u64,
    /// Recent records each file log keeps decoded in memory
    pub log_window_records: usize,
    pub compress_snapshots: bool,
    pub registry: RegistrySource,
    pub registry_poll_secs: u64,
    pub checkpoint_every_commands: u64,
    /// `None` disables the time trigger
    pub checkpoint_interval_secs: Option<u64>,
    pub bus_capacity: usize,
    pub ticker_interval_ms: u64,
    pub candles_interval_ms: u64,
    pub candles_delay_ms: u64,
    pub tick_retention: usize,
    pub book_depth: usize,
    pub book_snapshot_every: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            storage: StorageKind::File,
            fsync: FsyncMode::EveryWrite,
            max_segment_bytes: 64 * 1024 * 1024,
            log_window_records: 4_096,
            compress_snapshots: true,
            registry: RegistrySource::Static(vec![ProductId::new("BTC-USDT")]),
            registry_poll_secs: 5,
            checkpoint_every_commands: 1_000,
            checkpoint_interval_secs: Some(60),
            bus_capacity: 1_024,
            ticker_interval_ms: 3_000,
            candles_interval_ms: 1_000,
            candles_delay_ms: 1_000,
            tick_retention: 1_000,
            book_depth: 50,
            book_snapshot_every: 100,
        }
    }
}

impl NodeConfig {
    /// Read a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the config from the command line and environment.
    pub fn load(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn registry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.registry_poll_secs.max(1))
    }

    /// Journal settings for a log stored in `dir`
    pub fn journal(&self, dir: PathBuf) -> JournalConfig {
        JournalConfig {
            max_file_size: self.max_segment_bytes,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: self.fsync.into(),
            window_records: self.log_window_records.max(1),
            ..JournalConfig::new(dir)
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            checkpoint_every_commands: self.checkpoint_every_commands,
            checkpoint_interval: self.checkpoint_interval_secs.map(Duration::from_secs),
        }
    }

    pub fn ticker(&self) -> TickerConfig {
        TickerConfig {
            ticker_interval: Duration::from_millis(self.ticker_interval_ms),
            candles_interval: Duration::from_millis(self.candles_interval_ms),
            candles_delay: Duration::from_millis(self.candles_delay_ms),
            ..TickerConfig::default()
        }
    }

    pub fn order_book(&self) -> OrderBookConfig {
        OrderBookConfig {
            depth: self.book_depth,
            snapshot_every: self.book_snapshot_every.max(1),
        }
    }
}
