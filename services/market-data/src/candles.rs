//! OHLCV buckets
//!
//! The time-series side of the market data service: the [`TickStore`] trait
//! the ticker projection reads from, an in-memory store, the [`TickMaker`]
//! observer that folds trades into buckets for every configured granularity,
//! and [`merge_ticks`] which collapses a run of buckets into one.
//!
//! Bucket boundaries are aligned to the epoch (a 5-minute bucket starts on a
//! multiple of five minutes). All arithmetic is `Decimal`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use persistence::Observer;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use types::events::{LogEvent, MatchLog};
use types::ids::ProductId;
use types::tick::{Tick, CANDLE_GRANULARITIES};

use crate::ingestion::SequenceGuard;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickStoreError {
    #[error("tick store unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported granularity: {0}m")]
    UnsupportedGranularity(u32),
}

/// Read access to OHLCV buckets.
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Up to `count` most recent buckets, newest first.
    async fn get_buckets(
        &self,
        product_id: &ProductId,
        granularity: u32,
        count: usize,
    ) -> Result<Vec<Tick>, TickStoreError>;

    /// The most recent bucket, if any trade ever landed in one.
    async fn get_latest_bucket(
        &self,
        product_id: &ProductId,
        granularity: u32,
    ) -> Result<Option<Tick>, TickStoreError>;
}

/// Collapse chronologically ordered buckets into one.
///
/// `open` comes from the first bucket and `close` from the last; `high`,
/// `low` and `volume` cover all of them. Time and granularity are the first
/// bucket's. Returns `None` for an empty slice.
pub fn merge_ticks(ticks: &[Tick]) -> Option<Tick> {
    let (first, rest) = ticks.split_first()?;
    let mut merged = first.clone();
    for tick in rest {
        merged.close = tick.close;
        merged.high = merged.high.max(tick.high);
        merged.low = merged.low.min(tick.low);
        merged.volume += tick.volume;
    }
    Some(merged)
}

/// Process-local bucket store.
///
/// Keeps at most `retention` buckets per `(product, granularity)` series.
pub struct MemoryTickStore {
    granularities: Vec<u32>,
    retention: usize,
    series: DashMap<(ProductId, u32), BTreeMap<i64, Tick>>,
}

impl MemoryTickStore {
    pub fn new(granularities: Vec<u32>, retention: usize) -> Self {
        Self {
            granularities,
            retention: retention.max(1),
            series: DashMap::new(),
        }
    }

    pub fn granularities(&self) -> &[u32] {
        &self.granularities
    }

    /// Fold one trade into the bucket of every granularity.
    pub fn record_trade(&self, product_id: &ProductId, price: Decimal, size: Decimal, time: i64) {
        for &granularity in &self.granularities {
            let start = Tick::bucket_start(time, granularity);
            let mut series = self
                .series
                .entry((product_id.clone(), granularity))
                .or_default();

            series
                .entry(start)
                .and_modify(|tick| {
                    tick.high = tick.high.max(price);
                    tick.low = tick.low.min(price);
                    tick.close = price;
                    tick.volume += size;
                })
                .or_insert_with(|| Tick {
                    product_id: product_id.clone(),
                    granularity,
                    time: start,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: size,
                });

            while series.len() > self.retention {
                series.pop_first();
            }
        }
    }

    fn check_granularity(&self, granularity: u32) -> Result<(), TickStoreError> {
        if self.granularities.contains(&granularity) {
            Ok(())
        } else {
            Err(TickStoreError::UnsupportedGranularity(granularity))
        }
    }
}

impl Default for MemoryTickStore {
    fn default() -> Self {
        Self::new(CANDLE_GRANULARITIES.to_vec(), 1_000)
    }
}

#[async_trait]
impl TickStore for MemoryTickStore {
    async fn get_buckets(
        &self,
        product_id: &ProductId,
        granularity: u32,
        count: usize,
    ) -> Result<Vec<Tick>, TickStoreError> {
        self.check_granularity(granularity)?;
        let Some(series) = self.series.get(&(product_id.clone(), granularity)) else {
            return Ok(Vec::new());
        };
        Ok(series.values().rev().take(count).cloned().collect())
    }

    async fn get_latest_bucket(
        &self,
        product_id: &ProductId,
        granularity: u32,
    ) -> Result<Option<Tick>, TickStoreError> {
        self.check_granularity(granularity)?;
        Ok(self
            .series
            .get(&(product_id.clone(), granularity))
            .and_then(|series| series.values().next_back().cloned()))
    }
}

/// Observer that builds buckets from `match` events.
pub struct TickMaker {
    store: Arc<MemoryTickStore>,
    guard: SequenceGuard,
}

impl TickMaker {
    pub fn new(store: Arc<MemoryTickStore>) -> Self {
        Self {
            store,
            guard: SequenceGuard::new(),
        }
    }

    fn on_match(&self, trade: &MatchLog) {
        self.store.record_trade(
            &trade.product_id,
            trade.price.as_decimal(),
            trade.size.as_decimal(),
            trade.time,
        );
        debug!(trade_seq = trade.trade_seq, "Trade folded into buckets");
    }
}

#[async_trait]
impl Observer<LogEvent> for TickMaker {
    async fn on_record(&mut self, record: &LogEvent, _offset: u64) {
        if !self.guard.check(record.sequence()).is_applicable() {
            return;
        }
        if let LogEvent::Match(trade) = record {
            self.on_match(trade);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60 * 1_000_000_000;

    fn tick(open: i64, high: i64, low: i64, close: i64, volume: i64) -> Tick {
        Tick {
            product_id: ProductId::new("BTC-USDT"),
            granularity: 60,
            time: 0,
            open: Decimal::from(open),
            high: Decimal::from(high),
            low: Decimal::from(low),
            close: Decimal::from(close),
            volume: Decimal::from(volume),
        }
    }

    #[test]
    fn test_merge_ticks() {
        let merged = merge_ticks(&[tick(1, 5, 1, 3, 10), tick(3, 4, 2, 4, 5)]).unwrap();
        assert_eq!(merged, tick(1, 5, 1, 4, 15));
    }

    #[test]
    fn test_merge_single_and_empty() {
        assert_eq!(merge_ticks(&[tick(2, 3, 1, 2, 7)]), Some(tick(2, 3, 1, 2, 7)));
        assert_eq!(merge_ticks(&[]), None);
    }

    #[tokio::test]
    async fn test_trades_fold_into_aligned_buckets() {
        let store = MemoryTickStore::new(vec![1, 5], 100);
        let product = ProductId::new("BTC-USDT");
        store.record_trade(&product, Decimal::from(10), Decimal::ONE, 30 * 1_000_000_000);
        store.record_trade(&product, Decimal::from(12), Decimal::TWO, MINUTE + 1);
        store.record_trade(&product, Decimal::from(9), Decimal::ONE, 2 * MINUTE);

        let ones = store.get_buckets(&product, 1, 10).await.unwrap();
        assert_eq!(ones.len(), 3);
        assert_eq!(ones[0].time, 2 * MINUTE);
        assert_eq!(ones[2].time, 0);

        let five = store.get_latest_bucket(&product, 5).await.unwrap().unwrap();
        assert_eq!(five.time, 0);
        assert_eq!(five.open, Decimal::from(10));
        assert_eq!(five.high, Decimal::from(12));
        assert_eq!(five.low, Decimal::from(9));
        assert_eq!(five.close, Decimal::from(9));
        assert_eq!(five.volume, Decimal::from(4));
    }

    #[tokio::test]
    async fn test_retention_drops_oldest_buckets() {
        let store = MemoryTickStore::new(vec![1], 2);
        let product = ProductId::new("BTC-USDT");
        for minute in 0..5 {
            store.record_trade(&product, Decimal::ONE, Decimal::ONE, minute * MINUTE);
        }
        let buckets = store.get_buckets(&product, 1, 10).await.unwrap();
        let times: Vec<i64> = buckets.iter().map(|t| t.time).collect();
        assert_eq!(times, vec![4 * MINUTE, 3 * MINUTE]);
    }

    #[tokio::test]
    async fn test_unknown_series() {
        let store = MemoryTickStore::default();
        let product = ProductId::new("BTC-USDT");
        assert!(store.get_buckets(&product, 60, 24).await.unwrap().is_empty());
        assert!(store.get_latest_bucket(&product, 60).await.unwrap().is_none());
        assert_eq!(
            store.get_buckets(&product, 7, 1).await,
            Err(TickStoreError::UnsupportedGranularity(7))
        );
    }
}
