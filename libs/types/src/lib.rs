//! Types library for the exchange matching core
//!
//! Shared definitions used by the matching engine, the sequenced logs and the
//! market-data projections. Everything here is plain data: no I/O, no clocks
//! other than the formatting helpers in `time`.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, ProductId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `product`: Tradable product records
//! - `order`: Orders and the commands that reach the engine
//! - `events`: Output log events (Open, Done, Match)
//! - `tick`: OHLCV buckets
//! - `time`: Unix-nanos timestamp helpers
//! - `errors`: Error taxonomy

pub mod errors;
pub mod events;
pub mod ids;
pub mod numeric;
pub mod order;
pub mod product;
pub mod tick;
pub mod time;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::product::*;
    pub use crate::tick::*;
}
