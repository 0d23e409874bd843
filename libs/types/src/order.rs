//! Orders and engine input commands
//!
//! Commands arrive already validated upstream (balances, fees and risk are
//! settled elsewhere). The timestamp carried by a command becomes the `time` of
//! every event it produces, so replaying the input stream reproduces identical
//! output.

use crate::ids::{OrderId, ProductId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Rests on the book when not fully matched
    Limit,
    /// Takes whatever liquidity exists; never rests
    Market,
}

/// Order as carried by a placement command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; zero for market orders
    pub price: Price,
    pub size: Quantity,
    pub created_at: i64, // Unix nanos
}

impl Order {
    pub fn limit(
        id: OrderId,
        product_id: ProductId,
        side: Side,
        price: Price,
        size: Quantity,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            product_id,
            side,
            order_type: OrderType::Limit,
            price,
            size,
            created_at,
        }
    }

    pub fn market(
        id: OrderId,
        product_id: ProductId,
        side: Side,
        size: Quantity,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            product_id,
            side,
            order_type: OrderType::Market,
            price: Price::zero(),
            size,
            created_at,
        }
    }

    /// Whether an unfilled remainder is inserted into the book
    pub fn is_resting_type(&self) -> bool {
        self.order_type == OrderType::Limit
    }
}

/// Request to remove a resting order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub time: i64, // Unix nanos
}

/// Engine input command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Place(Order),
    Cancel(CancelOrder),
}

impl Command {
    pub fn product_id(&self) -> &ProductId {
        match self {
            Command::Place(order) => &order.product_id,
            Command::Cancel(cancel) => &cancel.product_id,
        }
    }

    /// Timestamp stamped on every event this command produces
    pub fn time(&self) -> i64 {
        match self {
            Command::Place(order) => order.created_at,
            Command::Cancel(cancel) => cancel.time,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            Command::Place(order) => order.id,
            Command::Cancel(cancel) => cancel.order_id,
        }
    }
}
