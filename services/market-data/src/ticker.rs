//! Ticker and candle projection
//!
//! Reads `match` events from the tail of a product's log. Tickers are
//! throttled: one per `ticker_interval` at most, built from the 24 most
//! recent hourly buckets and the 30 most recent daily buckets. Candle pushes
//! are throttled separately and delayed by `candles_delay`, giving the tick
//! maker time to fold the trade into its bucket before it is read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persistence::Observer;
use tokio::time::Instant;
use tracing::{debug, warn};
use types::events::{LogEvent, MatchLog};
use types::ids::ProductId;
use types::tick::CANDLE_GRANULARITIES;

use crate::bus::{Topic, TopicBus};
use crate::cache::MarketCache;
use crate::candles::{merge_ticks, TickStore, TickStoreError};
use crate::ingestion::SequenceGuard;
use crate::messages::{CandlesMessage, PushMessage, TickerMessage};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub ticker_interval: Duration,
    pub candles_interval: Duration,
    pub candles_delay: Duration,
    /// Granularity (minutes) and bucket count of the 24h window
    pub day_granularity: u32,
    pub day_buckets: usize,
    /// Granularity (minutes) and bucket count of the 30d window
    pub month_granularity: u32,
    pub month_buckets: usize,
    /// Granularities pushed on the candle topics
    pub candle_granularities: Vec<u32>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            ticker_interval: Duration::from_secs(3),
            candles_interval: Duration::from_secs(1),
            candles_delay: Duration::from_secs(1),
            day_granularity: 60,
            day_buckets: 24,
            month_granularity: 1440,
            month_buckets: 30,
            candle_granularities: CANDLE_GRANULARITIES.to_vec(),
        }
    }
}

pub struct TickerProjection {
    product_id: ProductId,
    bus: Arc<TopicBus>,
    ticks: Arc<dyn TickStore>,
    cache: Arc<MarketCache>,
    scheduler: Arc<dyn Scheduler>,
    config: TickerConfig,
    guard: SequenceGuard,
    last_ticker_at: Option<Instant>,
    last_candles_at: Option<Instant>,
}

fn elapsed_more_than(last: Option<Instant>, interval: Duration) -> bool {
    last.map_or(true, |at| at.elapsed() > interval)
}

impl TickerProjection {
    pub fn new(
        product_id: ProductId,
        bus: Arc<TopicBus>,
        ticks: Arc<dyn TickStore>,
        cache: Arc<MarketCache>,
        scheduler: Arc<dyn Scheduler>,
        config: TickerConfig,
    ) -> Self {
        Self {
            product_id,
            bus,
            ticks,
            cache,
            scheduler,
            config,
            guard: SequenceGuard::new(),
            last_ticker_at: None,
            last_candles_at: None,
        }
    }

    async fn on_match(&mut self, trade: &MatchLog) {
        if elapsed_more_than(self.last_ticker_at, self.config.ticker_interval) {
            match self.build_ticker(trade).await {
                Ok(Some(ticker)) => {
                    self.cache.store_ticker(&self.product_id, ticker.clone());
                    self.bus
                        .publish(&Topic::ticker(&self.product_id), PushMessage::Ticker(ticker));
                    self.last_ticker_at = Some(Instant::now());
                }
                Ok(None) => debug!(trade_seq = trade.trade_seq, "No buckets yet, ticker skipped"),
                Err(err) => warn!(error = %err, "Ticker aggregation failed"),
            }
        }

        if elapsed_more_than(self.last_candles_at, self.config.candles_interval) {
            self.schedule_candles();
            self.last_candles_at = Some(Instant::now());
        }
    }

    async fn build_ticker(&self, trade: &MatchLog) -> Result<Option<TickerMessage>, TickStoreError> {
        let mut day = self
            .ticks
            .get_buckets(&self.product_id, self.config.day_granularity, self.config.day_buckets)
            .await?;
        day.reverse();
        let Some(day) = merge_ticks(&day) else {
            return Ok(None);
        };

        let mut month = self
            .ticks
            .get_buckets(&self.product_id, self.config.month_granularity, self.config.month_buckets)
            .await?;
        month.reverse();
        let month = merge_ticks(&month);

        Ok(Some(TickerMessage::new(trade, &day, month.as_ref())))
    }

    fn schedule_candles(&self) {
        let product_id = self.product_id.clone();
        let bus = Arc::clone(&self.bus);
        let ticks = Arc::clone(&self.ticks);
        let granularities = self.config.candle_granularities.clone();

        self.scheduler.schedule(
            self.config.candles_delay,
            Box::pin(async move {
                publish_candles(&product_id, &bus, ticks.as_ref(), &granularities).await;
            }),
        );
    }
}

/// Push the latest bucket of each granularity on its candle topic.
async fn publish_candles(
    product_id: &ProductId,
    bus: &TopicBus,
    ticks: &dyn TickStore,
    granularities: &[u32],
) {
    for &granularity in granularities {
        match ticks.get_latest_bucket(product_id, granularity).await {
            Ok(Some(tick)) => {
                bus.publish(
                    &Topic::candles(granularity, product_id),
                    PushMessage::Candles(CandlesMessage::from(&tick)),
                );
            }
            Ok(None) => {}
            Err(err) => {
                warn!(product = %product_id, granularity, error = %err, "Candle refresh failed");
                return;
            }
        }
    }
}

#[async_trait]
impl Observer<LogEvent> for TickerProjection {
    async fn on_record(&mut self, record: &LogEvent, _offset: u64) {
        if !self.guard.check(record.sequence()).is_applicable() {
            return;
        }
        if let LogEvent::Match(trade) = record {
            self.on_match(trade).await;
        }
    }
}
