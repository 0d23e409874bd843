//! Output log events
//!
//! Every event carries a per-product `sequence` assigned by the matching
//! engine. Sequences start at 1 and increase by exactly one per event for the
//! whole lifetime of a product, restarts included.

use crate::ids::{OrderId, ProductId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// Why an order left the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneReason {
    Filled,
    Cancelled,
    Rejected,
}

impl DoneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoneReason::Filled => "filled",
            DoneReason::Cancelled => "cancelled",
            DoneReason::Rejected => "rejected",
        }
    }
}

/// An order came to rest on the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLog {
    pub sequence: u64,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub remaining_size: Quantity,
    pub time: i64,
}

/// An order left the book (or never entered it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneLog {
    pub sequence: u64,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Size that was still open when the order left
    pub remaining_size: Quantity,
    pub reason: DoneReason,
    pub time: i64,
}

/// One trade between a resting maker and an incoming taker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLog {
    pub sequence: u64,
    pub trade_seq: u64,
    pub product_id: ProductId,
    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,
    /// Taker's side
    pub side: Side,
    /// Maker's resting price
    pub price: Price,
    pub size: Quantity,
    pub time: i64,
}

/// Closed set of events written to a product's output log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEvent {
    Open(OpenLog),
    Done(DoneLog),
    Match(MatchLog),
}

impl LogEvent {
    pub fn sequence(&self) -> u64 {
        match self {
            LogEvent::Open(e) => e.sequence,
            LogEvent::Done(e) => e.sequence,
            LogEvent::Match(e) => e.sequence,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        match self {
            LogEvent::Open(e) => &e.product_id,
            LogEvent::Done(e) => &e.product_id,
            LogEvent::Match(e) => &e.product_id,
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            LogEvent::Open(e) => e.time,
            LogEvent::Done(e) => e.time,
            LogEvent::Match(e) => e.time,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::Open(_) => "open",
            LogEvent::Done(_) => "done",
            LogEvent::Match(_) => "match",
        }
    }
}
