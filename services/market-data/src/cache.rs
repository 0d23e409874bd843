//! Last-value cache
//!
//! Latest ticker and level-2 snapshot per product, for clients that need the
//! current state on subscribe instead of waiting for the next push.

use dashmap::DashMap;
use types::ids::ProductId;

use crate::messages::{Level2SnapshotMessage, TickerMessage};

#[derive(Default)]
pub struct MarketCache {
    tickers: DashMap<ProductId, TickerMessage>,
    books: DashMap<ProductId, Level2SnapshotMessage>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_ticker(&self, product_id: &ProductId, ticker: TickerMessage) {
        self.tickers.insert(product_id.clone(), ticker);
    }

    pub fn last_ticker(&self, product_id: &ProductId) -> Option<TickerMessage> {
        self.tickers.get(product_id).map(|entry| entry.value().clone())
    }

    pub fn store_book(&self, product_id: &ProductId, snapshot: Level2SnapshotMessage) {
        self.books.insert(product_id.clone(), snapshot);
    }

    pub fn book_snapshot(&self, product_id: &ProductId) -> Option<Level2SnapshotMessage> {
        self.books.get(product_id).map(|entry| entry.value().clone())
    }
}
