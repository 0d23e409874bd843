//! Book events
//!
//! What the order book reports for one command, before the engine assigns
//! sequence numbers and timestamps.

use types::events::DoneReason;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// Order rests on the book
    Open {
        order_id: OrderId,
        side: Side,
        price: Price,
        remaining_size: Quantity,
    },
    /// Order leaves the book
    Done {
        order_id: OrderId,
        side: Side,
        price: Price,
        remaining_size: Quantity,
        reason: DoneReason,
    },
    /// One trade at the maker's price
    Match {
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        taker_side: Side,
        price: Price,
        size: Quantity,
    },
}
