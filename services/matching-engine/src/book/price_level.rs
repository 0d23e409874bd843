//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at a specific price point.
//! Orders are kept in arrival order to enforce time priority.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

/// An order resting on the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub remaining: Quantity,
    pub created_at: i64,
    /// Book-assigned arrival sequence
    pub arrival: u64,
}

/// A price level containing orders at a specific price
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Queue of orders at this price level (FIFO order)
    orders: VecDeque<RestingOrder>,
    /// Total quantity available at this level
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order at the back of the queue (time priority)
    pub fn insert(&mut self, order: RestingOrder) {
        self.total_quantity += order.remaining;
        self.orders.push_back(order);
    }

    /// Remove an order from the queue by OrderId
    pub fn remove(&mut self, order_id: &OrderId) -> Option<RestingOrder> {
        let position = self.orders.iter().position(|o| &o.order_id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total_quantity = self.total_quantity.saturating_sub(order.remaining);
        Some(order)
    }

    /// Front order's id and remaining size
    pub fn peek_front(&self) -> Option<(OrderId, Quantity)> {
        self.orders.front().map(|o| (o.order_id, o.remaining))
    }

    /// Take `quantity` from the front order.
    ///
    /// Returns the order when this fill exhausted it; it has then already been
    /// removed from the queue.
    pub fn fill_front(&mut self, quantity: Quantity) -> Option<RestingOrder> {
        let front = self.orders.front_mut()?;
        let filled = quantity.min(front.remaining);
        front.remaining = front.remaining.saturating_sub(filled);
        self.total_quantity = self.total_quantity.saturating_sub(filled);

        if front.remaining.is_zero() {
            self.orders.pop_front()
        } else {
            None
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&RestingOrder> {
        self.orders.iter().find(|o| &o.order_id == order_id)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.iter()
    }
}
