//! Engine supervisor
//!
//! Polls the product registry and starts, for every product it has not seen
//! before, a matching engine and the readers on its output log:
//!
//! | reader      | starts at | observer               |
//! |-------------|-----------|------------------------|
//! | `ticks`     | offset 0  | `TickMaker`            |
//! | `orderbook` | offset 0  | `OrderBookProjection`  |
//! | `ticker`    | tail      | `TickerProjection`     |
//! | `match`     | tail      | `MatchProjection`      |
//!
//! Readers are positioned before the engine starts, so the tail readers see
//! exactly the events the engine appends in this process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use market_data::{
    MarketCache, MatchProjection, MemoryTickStore, OrderBookConfig, OrderBookProjection,
    Scheduler, TickMaker, TickerConfig, TickerProjection, TokioScheduler, TopicBus,
};
use matching_engine::{EngineConfig, EngineHandle, EnginePhase, MatchingEngine};
use persistence::{LogError, LogReader, ReadFrom, SequencedLog};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};
use types::events::LogEvent;
use types::ids::ProductId;
use types::order::Command;
use types::product::Product;
use types::tick::CANDLE_GRANULARITIES;

use crate::config::NodeConfig;
use crate::registry::{ProductRegistry, RegistryError};
use crate::storage::{ProductLogs, ProductStorage};

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("product registry failed: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub engine: EngineConfig,
    pub ticker: TickerConfig,
    pub order_book: OrderBookConfig,
    /// Buckets kept per product and granularity by the tick maker
    pub tick_retention: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            engine: EngineConfig::default(),
            ticker: TickerConfig::default(),
            order_book: OrderBookConfig::default(),
            tick_retention: 1_000,
        }
    }
}

impl From<&NodeConfig> for SupervisorConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            poll_interval: config.registry_poll_interval(),
            engine: config.engine(),
            ticker: config.ticker(),
            order_book: config.order_book(),
            tick_retention: config.tick_retention,
        }
    }
}

/// Tasks serving one product
pub struct ProductRuntime {
    pub product: Product,
    pub logs: ProductLogs,
    pub engine: EngineHandle,
    pub readers: Vec<JoinHandle<Result<(), LogError>>>,
}

pub struct EngineSupervisor {
    registry: Arc<dyn ProductRegistry>,
    storage: Arc<dyn ProductStorage>,
    bus: Arc<TopicBus>,
    cache: Arc<MarketCache>,
    ticks: Arc<MemoryTickStore>,
    scheduler: Arc<dyn Scheduler>,
    config: SupervisorConfig,
    products: HashMap<ProductId, ProductRuntime>,
}

impl EngineSupervisor {
    pub fn new(
        registry: Arc<dyn ProductRegistry>,
        storage: Arc<dyn ProductStorage>,
        bus: Arc<TopicBus>,
        config: SupervisorConfig,
    ) -> Self {
        let ticks = Arc::new(MemoryTickStore::new(
            CANDLE_GRANULARITIES.to_vec(),
            config.tick_retention,
        ));
        Self {
            registry,
            storage,
            bus,
            cache: Arc::new(MarketCache::new()),
            ticks,
            scheduler: Arc::new(TokioScheduler),
            config,
            products: HashMap::new(),
        }
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    /// Last tickers and book snapshots of every product
    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.products.keys()
    }

    pub fn runtime(&self, product_id: &ProductId) -> Option<&ProductRuntime> {
        self.products.get(product_id)
    }

    pub fn engine_phase(&self, product_id: &ProductId) -> Option<EnginePhase> {
        self.products.get(product_id).map(|runtime| runtime.engine.phase())
    }

    /// Input log of a running product, for submitting commands.
    pub fn command_log(&self, product_id: &ProductId) -> Option<Arc<dyn SequencedLog<Command>>> {
        self.products
            .get(product_id)
            .map(|runtime| Arc::clone(&runtime.logs.commands))
    }

    /// Start every listed product not running yet. Returns how many started.
    ///
    /// A product whose storage cannot be opened is skipped and retried on the
    /// next poll.
    pub async fn poll_once(&mut self) -> Result<usize, SupervisorError> {
        let products = self.registry.list_products().await?;
        let mut started = 0;
        for product in products {
            if self.products.contains_key(&product.id) {
                continue;
            }
            let logs = match self.storage.open(&product.id) {
                Ok(logs) => logs,
                Err(err) => {
                    error!(product = %product.id, error = %err, "Cannot open product storage");
                    continue;
                }
            };
            let runtime = self.start(product, logs);
            self.products.insert(runtime.product.id.clone(), runtime);
            started += 1;
        }
        Ok(started)
    }

    fn start(&self, product: Product, logs: ProductLogs) -> ProductRuntime {
        let product_id = product.id.clone();
        let events = logs.events.as_ref();

        let readers = vec![
            spawn_reader(
                &product_id,
                LogReader::new("ticks", events, ReadFrom::START),
                TickMaker::new(Arc::clone(&self.ticks)),
            ),
            spawn_reader(
                &product_id,
                LogReader::new("orderbook", events, ReadFrom::START),
                OrderBookProjection::new(
                    product_id.clone(),
                    Arc::clone(&self.bus),
                    Arc::clone(&self.cache),
                    self.config.order_book.clone(),
                ),
            ),
            spawn_reader(
                &product_id,
                LogReader::new("ticker", events, ReadFrom::Tail),
                TickerProjection::new(
                    product_id.clone(),
                    Arc::clone(&self.bus),
                    self.ticks.clone(),
                    Arc::clone(&self.cache),
                    Arc::clone(&self.scheduler),
                    self.config.ticker.clone(),
                ),
            ),
            spawn_reader(
                &product_id,
                LogReader::new("match", events, ReadFrom::Tail),
                MatchProjection::new(&product_id, Arc::clone(&self.bus)),
            ),
        ];

        let engine = MatchingEngine::new(
            product_id.clone(),
            Arc::clone(&logs.commands),
            Arc::clone(&logs.events),
            Arc::clone(&logs.snapshots),
            self.config.engine.clone(),
        )
        .spawn();

        info!(
            product = %product_id,
            base = %product.base_currency,
            quote = %product.quote_currency,
            "Product started"
        );
        ProductRuntime {
            product,
            logs,
            engine,
            readers,
        }
    }

    /// Poll the registry every `poll_interval` until it fails.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let started = self.poll_once().await?;
            if started > 0 {
                info!(started, running = self.products.len(), "Registry poll started products");
            }
        }
    }

    /// Stop every engine and reader task.
    pub fn shutdown(&mut self) {
        for (product_id, runtime) in self.products.drain() {
            runtime.engine.abort();
            for reader in &runtime.readers {
                reader.abort();
            }
            info!(product = %product_id, "Product stopped");
        }
    }
}

fn spawn_reader<O>(
    product_id: &ProductId,
    reader: LogReader<LogEvent>,
    observer: O,
) -> JoinHandle<Result<(), LogError>>
where
    O: persistence::Observer<LogEvent> + 'static,
{
    let span = info_span!("projection", product = %product_id);
    tokio::spawn(reader.run(observer).instrument(span))
}
