//! Level-2 order book projection
//!
//! Mirrors a product's book from its event log as aggregate size per price
//! level. Reads from the start of the log so the mirror is complete:
//! - `open` → add the remaining size to its level and track the order
//! - `match` → take the traded size from the maker's level
//! - `done` → remove whatever the order still contributes
//!
//! Each changed level is pushed as an `l2update`; a full snapshot is pushed
//! and cached every `snapshot_every` level changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use persistence::Observer;
use rust_decimal::Decimal;
use tracing::debug;
use types::events::LogEvent;
use types::ids::{OrderId, ProductId};
use types::order::Side;

use crate::bus::{Topic, TopicBus};
use crate::cache::MarketCache;
use crate::ingestion::SequenceGuard;
use crate::messages::{Level2SnapshotMessage, Level2UpdateMessage, PushMessage};

/// New aggregate size of one price level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub side: Side,
    pub price: Decimal,
    /// Zero when the level emptied
    pub size: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct TrackedOrder {
    side: Side,
    price: Decimal,
    remaining: Decimal,
}

/// Aggregated view of one product's book
#[derive(Debug, Clone, Default)]
pub struct OrderBookState {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    orders: HashMap<OrderId, TrackedOrder>,
    last_sequence: u64,
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in and report the levels it changed.
    pub fn apply(&mut self, event: &LogEvent) -> Option<LevelChange> {
        self.last_sequence = event.sequence();
        match event {
            LogEvent::Open(open) => {
                let price = open.price.as_decimal();
                let size = open.remaining_size.as_decimal();
                self.orders.insert(
                    open.order_id,
                    TrackedOrder {
                        side: open.side,
                        price,
                        remaining: size,
                    },
                );
                Some(self.adjust(open.side, price, size))
            }
            LogEvent::Match(trade) => {
                let size = trade.size.as_decimal();
                let order = self.orders.get_mut(&trade.maker_order_id)?;
                let taken = size.min(order.remaining);
                order.remaining -= taken;
                let (side, price) = (order.side, order.price);
                Some(self.adjust(side, price, -taken))
            }
            LogEvent::Done(done) => {
                let order = self.orders.remove(&done.order_id)?;
                if order.remaining.is_zero() {
                    return None;
                }
                Some(self.adjust(order.side, order.price, -order.remaining))
            }
        }
    }

    fn adjust(&mut self, side: Side, price: Decimal, delta: Decimal) -> LevelChange {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = levels.entry(price).or_insert(Decimal::ZERO);
        *level += delta;
        let size = if *level > Decimal::ZERO {
            *level
        } else {
            levels.remove(&price);
            Decimal::ZERO
        };
        LevelChange { side, price, size }
    }

    /// Best price first on both sides
    pub fn bids(&self, depth: usize) -> Vec<[Decimal; 2]> {
        self.bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, size)| [*price, *size])
            .collect()
    }

    pub fn asks(&self, depth: usize) -> Vec<[Decimal; 2]> {
        self.asks
            .iter()
            .take(depth)
            .map(|(price, size)| [*price, *size])
            .collect()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

#[derive(Debug, Clone)]
pub struct OrderBookConfig {
    /// Levels per side in snapshots
    pub depth: usize,
    /// Level changes between full snapshots
    pub snapshot_every: u64,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            depth: 50,
            snapshot_every: 100,
        }
    }
}

pub struct OrderBookProjection {
    product_id: ProductId,
    topic: Topic,
    bus: Arc<TopicBus>,
    cache: Arc<MarketCache>,
    config: OrderBookConfig,
    state: OrderBookState,
    guard: SequenceGuard,
    changes_since_snapshot: u64,
}

impl OrderBookProjection {
    pub fn new(
        product_id: ProductId,
        bus: Arc<TopicBus>,
        cache: Arc<MarketCache>,
        config: OrderBookConfig,
    ) -> Self {
        Self {
            topic: Topic::order_book(&product_id),
            product_id,
            bus,
            cache,
            config,
            state: OrderBookState::new(),
            guard: SequenceGuard::new(),
            changes_since_snapshot: 0,
        }
    }

    pub fn state(&self) -> &OrderBookState {
        &self.state
    }

    pub fn snapshot(&self) -> Level2SnapshotMessage {
        Level2SnapshotMessage::new(
            &self.product_id,
            self.state.last_sequence(),
            self.state.bids(self.config.depth),
            self.state.asks(self.config.depth),
        )
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot();
        debug!(sequence = snapshot.sequence, "Publishing book snapshot");
        self.cache.store_book(&self.product_id, snapshot.clone());
        self.bus
            .publish(&self.topic, PushMessage::Level2Snapshot(snapshot));
        self.changes_since_snapshot = 0;
    }
}

#[async_trait]
impl Observer<LogEvent> for OrderBookProjection {
    async fn on_record(&mut self, record: &LogEvent, _offset: u64) {
        if !self.guard.check(record.sequence()).is_applicable() {
            return;
        }
        let Some(change) = self.state.apply(record) else {
            return;
        };

        let update = Level2UpdateMessage::new(
            &self.product_id,
            record.sequence(),
            record.time(),
            change.side,
            change.price,
            change.size,
        );
        self.bus.publish(&self.topic, PushMessage::Level2Update(update));

        self.changes_since_snapshot += 1;
        if self.changes_since_snapshot >= self.config.snapshot_every {
            self.publish_snapshot();
        }
    }
}
