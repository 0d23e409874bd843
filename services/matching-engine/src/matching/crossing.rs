//! Crossing detection logic
//!
//! Determines when an incoming order can trade against a resting price

use types::numeric::Price;
use types::order::{OrderType, Side};

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming limit order crosses a resting price
pub fn incoming_can_match(incoming_side: Side, incoming_price: Price, resting_price: Price) -> bool {
    match incoming_side {
        Side::Buy => can_match(incoming_price, resting_price),
        Side::Sell => can_match(resting_price, incoming_price),
    }
}

/// Crossing rule for any order type; market orders cross every price
pub fn crosses(order_type: OrderType, side: Side, price: Price, resting_price: Price) -> bool {
    match order_type {
        OrderType::Market => true,
        OrderType::Limit => incoming_can_match(side, price, resting_price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_match_crossing() {
        assert!(can_match(Price::from_u64(50000), Price::from_u64(49000)));
        assert!(can_match(Price::from_u64(50000), Price::from_u64(50000)));
        assert!(!can_match(Price::from_u64(49000), Price::from_u64(50000)));
    }

    #[test]
    fn test_incoming_limit_orders() {
        let ten = Price::from_u64(10);
        let nine = Price::from_u64(9);
        assert!(incoming_can_match(Side::Buy, ten, nine));
        assert!(!incoming_can_match(Side::Buy, nine, ten));
        assert!(incoming_can_match(Side::Sell, nine, ten));
        assert!(!incoming_can_match(Side::Sell, ten, nine));
    }

    #[test]
    fn test_market_orders_always_cross() {
        let resting = Price::from_u64(1_000_000);
        assert!(crosses(OrderType::Market, Side::Buy, Price::zero(), resting));
        assert!(crosses(OrderType::Market, Side::Sell, Price::zero(), resting));
        assert!(!crosses(OrderType::Limit, Side::Buy, Price::zero(), resting));
    }
}
