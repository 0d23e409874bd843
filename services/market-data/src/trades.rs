//! Public trade stream
//!
//! Forwards every `match` event to the product's `match` topic as it is read.
//! No state beyond the sequence guard and no throttling.

use std::sync::Arc;

use async_trait::async_trait;
use persistence::Observer;
use tracing::trace;
use types::events::LogEvent;
use types::ids::ProductId;

use crate::bus::{Topic, TopicBus};
use crate::ingestion::SequenceGuard;
use crate::messages::{MatchMessage, PushMessage};

pub struct MatchProjection {
    topic: Topic,
    bus: Arc<TopicBus>,
    guard: SequenceGuard,
}

impl MatchProjection {
    pub fn new(product_id: &ProductId, bus: Arc<TopicBus>) -> Self {
        Self {
            topic: Topic::matches(product_id),
            bus,
            guard: SequenceGuard::new(),
        }
    }
}

#[async_trait]
impl Observer<LogEvent> for MatchProjection {
    async fn on_record(&mut self, record: &LogEvent, offset: u64) {
        if !self.guard.check(record.sequence()).is_applicable() {
            return;
        }
        let LogEvent::Match(trade) = record else {
            return;
        };
        let receivers = self
            .bus
            .publish(&self.topic, PushMessage::Match(MatchMessage::from(trade)));
        trace!(offset, trade_seq = trade.trade_seq, receivers, "Trade published");
    }
}
