//! Event sequencing
//!
//! Turns book events into log events. Sequences are per product, start at 1
//! and never skip; trades get their own `trade_seq` counter.

use crate::events::BookEvent;
use types::events::{DoneLog, LogEvent, MatchLog, OpenLog};
use types::ids::ProductId;

#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    last_sequence: u64,
    last_trade_seq: u64,
}

impl Sequencer {
    /// Continue after the given last-assigned numbers (0 for a fresh product)
    pub fn new(last_sequence: u64, last_trade_seq: u64) -> Self {
        Self {
            last_sequence,
            last_trade_seq,
        }
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn last_trade_seq(&self) -> u64 {
        self.last_trade_seq
    }

    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    fn next_trade_seq(&mut self) -> u64 {
        self.last_trade_seq += 1;
        self.last_trade_seq
    }

    /// Assign the next sequence number(s) and the command time.
    pub fn stamp(&mut self, product_id: &ProductId, event: BookEvent, time: i64) -> LogEvent {
        let sequence = self.next_sequence();
        let product_id = product_id.clone();
        match event {
            BookEvent::Open {
                order_id,
                side,
                price,
                remaining_size,
            } => LogEvent::Open(OpenLog {
                sequence,
                product_id,
                order_id,
                side,
                price,
                remaining_size,
                time,
            }),
            BookEvent::Done {
                order_id,
                side,
                price,
                remaining_size,
                reason,
            } => LogEvent::Done(DoneLog {
                sequence,
                product_id,
                order_id,
                side,
                price,
                remaining_size,
                reason,
                time,
            }),
            BookEvent::Match {
                maker_order_id,
                taker_order_id,
                taker_side,
                price,
                size,
            } => LogEvent::Match(MatchLog {
                sequence,
                trade_seq: self.next_trade_seq(),
                product_id,
                taker_order_id,
                maker_order_id,
                side: taker_side,
                price,
                size,
                time,
            }),
        }
    }
}
