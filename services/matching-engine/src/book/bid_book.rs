//! Bid (buy-side) order book
//!
//! Maintains buy orders sorted by price descending (best bid first).
//! Uses BTreeMap for deterministic iteration order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::{PriceLevel, RestingOrder};
use super::BookSide;

/// Bid (buy) side order book
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BidBook {
    /// Price levels keyed ascending; the best bid is the last key
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: RestingOrder) {
        self.levels.entry(order.price).or_default().insert(order);
    }

    /// Remove an order, dropping its level when it becomes empty
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<RestingOrder> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    pub fn get(&self, order_id: &OrderId, price: Price) -> Option<&RestingOrder> {
        self.levels.get(&price)?.get(order_id)
    }

    /// Highest bid price and the quantity resting there
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Top N price levels, best first
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    /// Every resting order in priority order
    pub fn orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.levels.values().rev().flat_map(|level| level.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl BookSide for BidBook {
    fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next_back()
            .map(|(price, level)| (*price, level))
    }

    fn remove_level_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::Side;

    fn bid(id: u64, price: u64, qty: u64) -> RestingOrder {
        RestingOrder {
            order_id: OrderId::new(id),
            side: Side::Buy,
            price: Price::from_u64(price),
            remaining: Quantity::from_u64(qty),
            created_at: 0,
            arrival: id,
        }
    }

    #[test]
    fn test_best_bid_is_highest() {
        let mut book = BidBook::new();
        book.insert(bid(1, 49000, 1));
        book.insert(bid(2, 50000, 2));
        book.insert(bid(3, 48000, 3));

        assert_eq!(book.best_bid(), Some((Price::from_u64(50000), Quantity::from_u64(2))));
        assert_eq!(book.level_count(), 3);
    }

    #[test]
    fn test_depth_snapshot_descending() {
        let mut book = BidBook::new();
        book.insert(bid(1, 10, 1));
        book.insert(bid(2, 12, 1));
        book.insert(bid(3, 11, 1));
        book.insert(bid(4, 12, 4));

        let depth = book.depth_snapshot(2);
        assert_eq!(
            depth,
            vec![
                (Price::from_u64(12), Quantity::from_u64(5)),
                (Price::from_u64(11), Quantity::from_u64(1)),
            ]
        );
        let ids: Vec<_> = book.orders().map(|o| o.order_id.value()).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut book = BidBook::new();
        book.insert(bid(1, 50000, 1));

        assert!(book.remove(&OrderId::new(1), Price::from_u64(50000)).is_some());
        assert!(book.is_empty());
        assert!(book.remove(&OrderId::new(1), Price::from_u64(50000)).is_none());
    }
}
