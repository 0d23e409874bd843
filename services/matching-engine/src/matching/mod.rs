//! Matching logic module
//!
//! Crossing rules and event sequencing

pub mod crossing;
pub mod sequencer;

pub use crossing::can_match;
pub use sequencer::Sequencer;
