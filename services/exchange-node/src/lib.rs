//! Exchange Node
//!
//! Hosts one matching engine per listed product together with the market
//! data projections on its output log, all in one process:
//! - `config`: node configuration file and environment overrides
//! - `registry`: where the product list comes from
//! - `storage`: per-product command log, event log and snapshot store
//! - `supervisor`: starts engines and projections as products appear

pub mod config;
pub mod registry;
pub mod storage;
pub mod supervisor;

pub use config::{ConfigError, NodeConfig, RegistrySource, StorageKind};
pub use registry::{FileRegistry, ProductRegistry, RegistryError, StaticRegistry};
pub use storage::{FileStorage, MemoryStorage, ProductLogs, ProductStorage, StorageError};
pub use supervisor::{EngineSupervisor, ProductRuntime, SupervisorConfig, SupervisorError};

use std::sync::Arc;

use market_data::TopicBus;

/// Wire a supervisor from the node configuration.
pub fn build_supervisor(config: &NodeConfig) -> EngineSupervisor {
    let registry: Arc<dyn ProductRegistry> = match &config.registry {
        RegistrySource::Static(ids) => Arc::new(StaticRegistry::from_ids(ids.iter().cloned())),
        RegistrySource::File(path) => Arc::new(FileRegistry::new(path)),
    };
    let storage: Arc<dyn ProductStorage> = match config.storage {
        StorageKind::File => Arc::new(FileStorage::new(config.clone())),
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    };
    EngineSupervisor::new(
        registry,
        storage,
        Arc::new(TopicBus::new(config.bus_capacity)),
        SupervisorConfig::from(config),
    )
}
