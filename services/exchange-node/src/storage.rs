//! Per-product storage factory
//!
//! ```text
//! <data_dir>/<product>/commands.log/journal-*.bin   engine input
//! <data_dir>/<product>/events.log/journal-*.bin     engine output
//! <data_dir>/snapshots/<product>.snap[.zst]         latest snapshot
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use persistence::{
    FileLog, FileSnapshotStore, LogError, MemoryLog, MemorySnapshotStore, SequencedLog,
    SnapshotStore,
};
use thiserror::Error;
use types::events::LogEvent;
use types::ids::ProductId;
use types::order::Command;

use crate::config::NodeConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot open {log} log for {product}: {source}")]
    Log {
        product: ProductId,
        log: &'static str,
        #[source]
        source: LogError,
    },
}

/// Everything one product's engine reads and writes
#[derive(Clone)]
pub struct ProductLogs {
    pub commands: Arc<dyn SequencedLog<Command>>,
    pub events: Arc<dyn SequencedLog<LogEvent>>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

pub trait ProductStorage: Send + Sync {
    fn open(&self, product_id: &ProductId) -> Result<ProductLogs, StorageError>;
}

/// Directory name for a product; anything outside `[A-Za-z0-9_-]` becomes `_`.
fn dir_name(product_id: &ProductId) -> String {
    product_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Journals and snapshot files under one data directory
pub struct FileStorage {
    config: NodeConfig,
    snapshots: Arc<FileSnapshotStore>,
}

impl FileStorage {
    pub fn new(config: NodeConfig) -> Self {
        let snapshots = Arc::new(FileSnapshotStore::new(
            config.data_dir.join("snapshots"),
            config.compress_snapshots,
        ));
        Self { config, snapshots }
    }

    fn product_dir(&self, product_id: &ProductId) -> PathBuf {
        self.config.data_dir.join(dir_name(product_id))
    }
}

impl ProductStorage for FileStorage {
    fn open(&self, product_id: &ProductId) -> Result<ProductLogs, StorageError> {
        let dir = self.product_dir(product_id);
        let commands = FileLog::<Command>::open(self.config.journal(dir.join("commands.log")))
            .map_err(|source| StorageError::Log {
                product: product_id.clone(),
                log: "commands",
                source,
            })?;
        let events = FileLog::<LogEvent>::open(self.config.journal(dir.join("events.log")))
            .map_err(|source| StorageError::Log {
                product: product_id.clone(),
                log: "events",
                source,
            })?;

        Ok(ProductLogs {
            commands: Arc::new(commands),
            events: Arc::new(events),
            snapshots: self.snapshots.clone(),
        })
    }
}

/// Process-local storage; reopening a product returns the same logs.
#[derive(Default)]
pub struct MemoryStorage {
    products: Mutex<HashMap<ProductId, ProductLogs>>,
    snapshots: Arc<MemorySnapshotStore>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProductStorage for MemoryStorage {
    fn open(&self, product_id: &ProductId) -> Result<ProductLogs, StorageError> {
        let mut products = self.products.lock().unwrap_or_else(PoisonError::into_inner);
        let logs = products.entry(product_id.clone()).or_insert_with(|| {
            let commands: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
            let events: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
            ProductLogs {
                commands,
                events,
                snapshots: self.snapshots.clone(),
            }
        });
        Ok(logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::ids::OrderId;
    use types::numeric::Quantity;
    use types::order::{Order, Side};

    fn place(id: u64) -> Command {
        Command::Place(Order::market(
            OrderId::new(id),
            ProductId::new("BTC-USDT"),
            Side::Buy,
            Quantity::from_u64(1),
            0,
        ))
    }

    #[tokio::test]
    async fn test_memory_storage_reopen_shares_logs() {
        let storage = MemoryStorage::new();
        let product = ProductId::new("BTC-USDT");

        let first = storage.open(&product).unwrap();
        first.commands.append(place(1)).await.unwrap();

        let again = storage.open(&product).unwrap();
        assert_eq!(again.commands.len(), 1);

        let other = storage.open(&ProductId::new("ETH-USDT")).unwrap();
        assert!(other.commands.is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_layout_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = NodeConfig {
            data_dir: tmp.path().to_path_buf(),
            ..NodeConfig::default()
        };
        let product = ProductId::new("BTC-USDT");

        {
            let logs = FileStorage::new(config.clone()).open(&product).unwrap();
            logs.commands.append(place(1)).await.unwrap();
            logs.commands.append(place(2)).await.unwrap();
        }

        assert!(tmp.path().join("BTC-USDT").join("commands.log").is_dir());
        assert!(tmp.path().join("BTC-USDT").join("events.log").is_dir());

        let logs = FileStorage::new(config).open(&product).unwrap();
        assert_eq!(logs.commands.len(), 2);
        assert!(logs.events.is_empty());
        assert!(logs.snapshots.get_latest(&product).await.unwrap().is_none());
    }

    #[test]
    fn test_dir_name_replaces_path_characters() {
        assert_eq!(dir_name(&ProductId::new("BTC/USDT")), "BTC_USDT");
        assert_eq!(dir_name(&ProductId::new("eth-usd_1")), "eth-usd_1");
    }
}
