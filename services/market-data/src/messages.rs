//! Push messages
//!
//! Flat JSON records delivered on the topic bus. Decimal fields serialize as
//! strings and times as RFC 3339 UTC, so no precision is lost on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::events::MatchLog;
use types::ids::ProductId;
use types::order::Side;
use types::tick::Tick;
use types::time::to_rfc3339;

/// Last trade plus rolling 24h / 30d aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub trade_id: u64,
    pub sequence: u64,
    pub time: String,
    pub product_id: String,
    pub price: Decimal,
    pub side: String,
    pub last_size: Decimal,
    pub open_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub volume_30d: Decimal,
}

impl TickerMessage {
    /// `day` and `month` are the merged 24h and 30d buckets.
    pub fn new(trade: &MatchLog, day: &Tick, month: Option<&Tick>) -> Self {
        Self {
            kind: "ticker".to_string(),
            trade_id: trade.trade_seq,
            sequence: trade.sequence,
            time: to_rfc3339(trade.time),
            product_id: trade.product_id.to_string(),
            price: trade.price.as_decimal(),
            side: trade.side.to_string(),
            last_size: trade.size.as_decimal(),
            open_24h: day.open,
            high_24h: day.high,
            low_24h: day.low,
            volume_24h: day.volume,
            volume_30d: month.map_or(Decimal::ZERO, |tick| tick.volume),
        }
    }
}

/// One trade print
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub trade_id: u64,
    pub sequence: u64,
    pub time: String,
    pub product_id: String,
    pub price: Decimal,
    /// Taker side
    pub side: String,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub size: Decimal,
}

impl From<&MatchLog> for MatchMessage {
    fn from(trade: &MatchLog) -> Self {
        Self {
            kind: "match".to_string(),
            trade_id: trade.trade_seq,
            sequence: trade.sequence,
            time: to_rfc3339(trade.time),
            product_id: trade.product_id.to_string(),
            price: trade.price.as_decimal(),
            side: trade.side.to_string(),
            maker_order_id: trade.maker_order_id.to_string(),
            taker_order_id: trade.taker_order_id.to_string(),
            size: trade.size.as_decimal(),
        }
    }
}

/// Latest bucket of one granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlesMessage {
    /// `candles_<g>m`
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: String,
    pub time: String,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub volume: Decimal,
}

impl From<&Tick> for CandlesMessage {
    fn from(tick: &Tick) -> Self {
        Self {
            kind: format!("candles_{}m", tick.granularity),
            product_id: tick.product_id.to_string(),
            time: to_rfc3339(tick.time),
            open: tick.open,
            close: tick.close,
            low: tick.low,
            high: tick.high,
            volume: tick.volume,
        }
    }
}

/// Full level-2 view, best levels first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2SnapshotMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: String,
    pub sequence: u64,
    /// `[price, size]` pairs
    pub bids: Vec<[Decimal; 2]>,
    pub asks: Vec<[Decimal; 2]>,
}

impl Level2SnapshotMessage {
    pub fn new(
        product_id: &ProductId,
        sequence: u64,
        bids: Vec<[Decimal; 2]>,
        asks: Vec<[Decimal; 2]>,
    ) -> Self {
        Self {
            kind: "snapshot".to_string(),
            product_id: product_id.to_string(),
            sequence,
            bids,
            asks,
        }
    }
}

/// New aggregate size of one level; zero means the level is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2UpdateMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: String,
    pub sequence: u64,
    pub time: String,
    pub side: String,
    pub price: Decimal,
    pub size: Decimal,
}

impl Level2UpdateMessage {
    pub fn new(
        product_id: &ProductId,
        sequence: u64,
        time: i64,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            kind: "l2update".to_string(),
            product_id: product_id.to_string(),
            sequence,
            time: to_rfc3339(time),
            side: side.to_string(),
            price,
            size,
        }
    }
}

/// Anything published on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PushMessage {
    Ticker(TickerMessage),
    Match(MatchMessage),
    Candles(CandlesMessage),
    Level2Snapshot(Level2SnapshotMessage),
    Level2Update(Level2UpdateMessage),
}

impl PushMessage {
    /// Value of the `type` field
    pub fn kind(&self) -> &str {
        match self {
            PushMessage::Ticker(m) => &m.kind,
            PushMessage::Match(m) => &m.kind,
            PushMessage::Candles(m) => &m.kind,
            PushMessage::Level2Snapshot(m) => &m.kind,
            PushMessage::Level2Update(m) => &m.kind,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
