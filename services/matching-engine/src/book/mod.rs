//! Order book infrastructure module
//!
//! Contains price levels, bid book, ask book and the per-product order book.

pub mod ask_book;
pub mod bid_book;
pub mod order_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use order_book::{BookDepth, OrderBook};
pub use price_level::{PriceLevel, RestingOrder};

use types::numeric::Price;

/// The side of the book an incoming order takes liquidity from.
pub(crate) trait BookSide {
    /// Best level with its price
    fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)>;

    fn remove_level_if_empty(&mut self, price: Price);
}
