//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Uses BTreeMap for deterministic iteration order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::{PriceLevel, RestingOrder};
use super::BookSide;

/// Ask (sell) side order book
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AskBook {
    /// Price levels sorted ascending (lowest price first)
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
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

    /// Lowest ask price and the quantity resting there
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Top N price levels, best first
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    /// Every resting order in priority order
    pub fn orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.levels.values().flat_map(|level| level.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl BookSide for AskBook {
    fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next()
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

    fn ask(id: u64, price: u64, qty: u64) -> RestingOrder {
        RestingOrder {
            order_id: OrderId::new(id),
            side: Side::Sell,
            price: Price::from_u64(price),
            remaining: Quantity::from_u64(qty),
            created_at: 0,
            arrival: id,
        }
    }

    #[test]
    fn test_best_ask_is_lowest() {
        let mut book = AskBook::new();
        book.insert(ask(1, 51000, 1));
        book.insert(ask(2, 50000, 2));

        assert_eq!(book.best_ask(), Some((Price::from_u64(50000), Quantity::from_u64(2))));
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(50000)));
    }

    #[test]
    fn test_best_level_mut_and_cleanup() {
        let mut book = AskBook::new();
        book.insert(ask(1, 10, 2));
        book.insert(ask(2, 11, 1));

        {
            let (price, level) = book.best_level_mut().unwrap();
            assert_eq!(price, Price::from_u64(10));
            assert!(level.fill_front(Quantity::from_u64(2)).is_some());
        }
        book.remove_level_if_empty(Price::from_u64(10));
        assert_eq!(book.best_ask_price(), Some(Price::from_u64(11)));
        assert_eq!(book.level_count(), 1);
    }

    #[test]
    fn test_orders_in_priority() {
        let mut book = AskBook::new();
        book.insert(ask(1, 11, 1));
        book.insert(ask(2, 10, 1));
        book.insert(ask(3, 10, 1));

        let ids: Vec<_> = book.orders().map(|o| o.order_id.value()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(book.depth_snapshot(5).len(), 2);
    }
}
