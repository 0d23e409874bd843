//! Market Data Service
//!
//! Projections that tail a product's event log and turn it into pushes on
//! the topic bus:
//! - Trade prints, one per `match`
//! - Throttled tickers with rolling 24h / 30d aggregates
//! - Delayed candle refreshes per granularity
//! - Level-2 book updates and periodic snapshots
//!
//! Every projection is an `Observer<LogEvent>` driven by its own
//! `LogReader`, so each consumes the log at its own pace.
//!
//! # Architecture
//!
//! ```text
//!            output log (per product)
//!     ┌──────────┬────────┴───┬─────────────┐
//! ┌───▼────┐ ┌───▼───┐ ┌──────▼─────┐ ┌─────▼─────┐
//! │TickMkr │ │Trades │ │Ticker      │ │Order book │
//! └───┬────┘ └───┬───┘ └──┬───────┬─┘ └─────┬─────┘
//!     │          │        │  reads│         │
//!  TickStore ◄───┼────────┼───────┘         │
//!                │        │                 │
//!            ┌───▼────────▼─────────────────▼┐
//!            │          TopicBus             │
//!            └───────────────────────────────┘
//! ```

pub mod bus;
pub mod cache;
pub mod candles;
pub mod ingestion;
pub mod messages;
pub mod order_book;
pub mod scheduler;
pub mod ticker;
pub mod trades;

pub use bus::{ChannelKind, Topic, TopicBus};
pub use cache::MarketCache;
pub use candles::{merge_ticks, MemoryTickStore, TickMaker, TickStore, TickStoreError};
pub use messages::PushMessage;
pub use order_book::{OrderBookConfig, OrderBookProjection};
pub use scheduler::{Scheduler, Task, TokioScheduler};
pub use ticker::{TickerConfig, TickerProjection};
pub use trades::MatchProjection;
