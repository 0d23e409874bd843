//! Matching Engine Service
//!
//! Per-product price-time matching over an input command log. Each engine
//! restores its book from the latest snapshot, replays the commands after it
//! and appends sequenced `open`/`done`/`match` events to the output log.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced
//! - Deterministic matching (same inputs → same outputs)
//! - Output sequences start at 1 and never skip
//! - The book is never crossed after a command completes

pub mod book;
pub mod engine;
pub mod error;
pub mod events;
pub mod matching;
pub mod recovery;

pub use book::OrderBook;
pub use engine::{EngineConfig, EngineHandle, EnginePhase, MatchingEngine};
pub use error::EngineError;
pub use events::BookEvent;
pub use recovery::{RecoveryPoint, RecoveryReport};
