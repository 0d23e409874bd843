//! Topic bus
//!
//! In-process pub/sub keyed by `(channel kind, product)`. Each topic is a
//! bounded `broadcast` channel: delivery is best-effort and at-most-once, a
//! subscriber that falls behind loses the oldest messages, and nothing is
//! retained for topics nobody listens to.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use types::ids::ProductId;

use crate::messages::PushMessage;

/// Channel kinds clients subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    Ticker,
    Match,
    OrderBook,
    /// Candles of the given granularity in minutes
    Candles(u32),
}

impl ChannelKind {
    /// Parse `ticker`, `match`, `orderbook` or `candles_<g>m`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticker" => Some(ChannelKind::Ticker),
            "match" => Some(ChannelKind::Match),
            "orderbook" => Some(ChannelKind::OrderBook),
            other => {
                let minutes = other.strip_prefix("candles_")?.strip_suffix('m')?;
                minutes.parse().ok().map(ChannelKind::Candles)
            }
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Ticker => write!(f, "ticker"),
            ChannelKind::Match => write!(f, "match"),
            ChannelKind::OrderBook => write!(f, "orderbook"),
            ChannelKind::Candles(granularity) => write!(f, "candles_{}m", granularity),
        }
    }
}

/// A subscription stream: `kind:product`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub kind: ChannelKind,
    pub product_id: ProductId,
}

impl Topic {
    pub fn new(kind: ChannelKind, product_id: ProductId) -> Self {
        Self { kind, product_id }
    }

    pub fn ticker(product_id: &ProductId) -> Self {
        Self::new(ChannelKind::Ticker, product_id.clone())
    }

    pub fn matches(product_id: &ProductId) -> Self {
        Self::new(ChannelKind::Match, product_id.clone())
    }

    pub fn order_book(product_id: &ProductId) -> Self {
        Self::new(ChannelKind::OrderBook, product_id.clone())
    }

    pub fn candles(granularity: u32, product_id: &ProductId) -> Self {
        Self::new(ChannelKind::Candles(granularity), product_id.clone())
    }

    /// Parse the `kind:product` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, product) = s.split_once(':')?;
        let kind = ChannelKind::parse(kind)?;
        let product_id = ProductId::try_new(product).ok()?;
        Some(Self { kind, product_id })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.product_id)
    }
}

/// Shared handle to a published message
pub type BusMessage = Arc<PushMessage>;

/// Per-topic broadcast channels
pub struct TopicBus {
    capacity: usize,
    topics: DashMap<Topic, broadcast::Sender<BusMessage>>,
}

impl TopicBus {
    /// `capacity` is how many messages a subscriber may lag before losing some.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: DashMap::new(),
        }
    }

    /// Deliver `message` to the topic's current subscribers.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, topic: &Topic, message: PushMessage) -> usize {
        let Some(sender) = self.topics.get(topic).map(|entry| entry.value().clone()) else {
            trace!(topic = %topic, "No subscribers, dropping message");
            return 0;
        };
        match sender.send(Arc::new(message)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(topic = %topic, "No subscribers, dropping message");
                0
            }
        }
    }

    /// Receive messages published on `topic` from now on.
    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<BusMessage> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |entry| entry.value().receiver_count())
    }
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
