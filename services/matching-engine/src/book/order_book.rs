//! Per-product order book
//!
//! Pure price-time priority matching. `apply` never performs I/O and its
//! output depends only on the current book state and the command, which is
//! what makes replay from the input log reproduce the output log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::events::DoneReason;
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Quantity};
use types::order::{CancelOrder, Command, Order, OrderType, Side};

use super::ask_book::AskBook;
use super::bid_book::BidBook;
use super::price_level::RestingOrder;
use super::BookSide;
use crate::events::BookEvent;
use crate::matching::crossing;

/// Top levels of both sides, best first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookDepth {
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    product_id: ProductId,
    bids: BidBook,
    asks: AskBook,
    /// Where each resting order lives
    index: BTreeMap<OrderId, (Side, Price)>,
    next_arrival: u64,
}

/// Incoming order while it takes liquidity
struct Taker {
    id: OrderId,
    side: Side,
    order_type: OrderType,
    price: Price,
    remaining: Quantity,
}

impl Taker {
    fn crosses(&self, resting_price: Price) -> bool {
        crossing::crosses(self.order_type, self.side, self.price, resting_price)
    }
}

impl OrderBook {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            bids: BidBook::new(),
            asks: AskBook::new(),
            index: BTreeMap::new(),
            next_arrival: 0,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Apply one command and report what happened, in order.
    pub fn apply(&mut self, command: &Command) -> Vec<BookEvent> {
        match command {
            Command::Place(order) => self.place(order),
            Command::Cancel(cancel) => self.cancel(cancel),
        }
    }

    fn place(&mut self, order: &Order) -> Vec<BookEvent> {
        let mut events = Vec::new();

        if order.product_id != self.product_id
            || order.size.is_zero()
            || self.index.contains_key(&order.id)
        {
            events.push(BookEvent::Done {
                order_id: order.id,
                side: order.side,
                price: order.price,
                remaining_size: order.size,
                reason: DoneReason::Rejected,
            });
            return events;
        }

        let mut taker = Taker {
            id: order.id,
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            remaining: order.size,
        };
        match order.side {
            Side::Buy => take_liquidity(&mut self.asks, &mut self.index, &mut taker, &mut events),
            Side::Sell => take_liquidity(&mut self.bids, &mut self.index, &mut taker, &mut events),
        }

        if taker.remaining.is_zero() {
            events.push(BookEvent::Done {
                order_id: order.id,
                side: order.side,
                price: order.price,
                remaining_size: Quantity::zero(),
                reason: DoneReason::Filled,
            });
        } else if order.is_resting_type() {
            let resting = RestingOrder {
                order_id: order.id,
                side: order.side,
                price: order.price,
                remaining: taker.remaining,
                created_at: order.created_at,
                arrival: self.next_arrival,
            };
            self.next_arrival += 1;
            self.index.insert(order.id, (order.side, order.price));
            match order.side {
                Side::Buy => self.bids.insert(resting),
                Side::Sell => self.asks.insert(resting),
            }
            events.push(BookEvent::Open {
                order_id: order.id,
                side: order.side,
                price: order.price,
                remaining_size: taker.remaining,
            });
        } else {
            events.push(BookEvent::Done {
                order_id: order.id,
                side: order.side,
                price: order.price,
                remaining_size: taker.remaining,
                reason: DoneReason::Cancelled,
            });
        }

        events
    }

    fn cancel(&mut self, cancel: &CancelOrder) -> Vec<BookEvent> {
        if cancel.product_id != self.product_id {
            return Vec::new();
        }
        let Some((side, price)) = self.index.remove(&cancel.order_id) else {
            return Vec::new();
        };
        let removed = match side {
            Side::Buy => self.bids.remove(&cancel.order_id, price),
            Side::Sell => self.asks.remove(&cancel.order_id, price),
        };
        debug_assert!(removed.is_some(), "indexed order missing from its level");

        removed
            .map(|order| BookEvent::Done {
                order_id: order.order_id,
                side: order.side,
                price: order.price,
                remaining_size: order.remaining,
                reason: DoneReason::Cancelled,
            })
            .into_iter()
            .collect()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_bid_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_ask_price()
    }

    /// Whether the best bid reaches the best ask; never true between commands
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => crossing::can_match(bid, ask),
            _ => false,
        }
    }

    pub fn depth(&self, levels: usize) -> BookDepth {
        BookDepth {
            bids: self.bids.depth_snapshot(levels),
            asks: self.asks.depth_snapshot(levels),
        }
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&RestingOrder> {
        let (side, price) = self.index.get(order_id)?;
        match side {
            Side::Buy => self.bids.get(order_id, *price),
            Side::Sell => self.asks.get(order_id, *price),
        }
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Resting orders of one side in matching priority
    pub fn resting_orders(&self, side: Side) -> Vec<&RestingOrder> {
        match side {
            Side::Buy => self.bids.orders().collect(),
            Side::Sell => self.asks.orders().collect(),
        }
    }

    /// Serialize for a snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Match `taker` against the opposite side until it is filled or stops crossing.
fn take_liquidity<B: BookSide>(
    opposite: &mut B,
    index: &mut BTreeMap<OrderId, (Side, Price)>,
    taker: &mut Taker,
    events: &mut Vec<BookEvent>,
) {
    while !taker.remaining.is_zero() {
        let Some((price, level)) = opposite.best_level_mut() else {
            break;
        };
        if !taker.crosses(price) {
            break;
        }
        let Some((maker_id, maker_remaining)) = level.peek_front() else {
            opposite.remove_level_if_empty(price);
            continue;
        };

        let size = taker.remaining.min(maker_remaining);
        let filled = level.fill_front(size);
        taker.remaining = taker.remaining.saturating_sub(size);

        events.push(BookEvent::Match {
            maker_order_id: maker_id,
            taker_order_id: taker.id,
            taker_side: taker.side,
            price,
            size,
        });

        if let Some(maker) = filled {
            index.remove(&maker.order_id);
            events.push(BookEvent::Done {
                order_id: maker.order_id,
                side: maker.side,
                price: maker.price,
                remaining_size: Quantity::zero(),
                reason: DoneReason::Filled,
            });
            opposite.remove_level_if_empty(price);
        }
    }
}
