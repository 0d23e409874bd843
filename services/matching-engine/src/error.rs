//! Engine errors
//!
//! Every variant is fatal for the product's engine. It stops; input is never
//! skipped.

use persistence::{LogError, SnapshotError};
use thiserror::Error;
use types::ids::ProductId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Input log failure: {0}")]
    Input(#[source] LogError),

    #[error("Output log failure: {0}")]
    Output(#[source] LogError),

    #[error("Snapshot store failure: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Book state error: {0}")]
    BookState(String),

    #[error("Output log for {product} ends at sequence {log} but its snapshot is at {snapshot}")]
    LogBehindSnapshot {
        product: ProductId,
        snapshot: u64,
        log: u64,
    },

    #[error("Input log for {product} holds {input_len} commands but its snapshot resumes at offset {resume_offset}")]
    InputBehindSnapshot {
        product: ProductId,
        resume_offset: u64,
        input_len: u64,
    },

    #[error("Output log for {product} is at sequence {committed} but replaying the input log only reached {replayed}")]
    InputBehindOutput {
        product: ProductId,
        committed: u64,
        replayed: u64,
    },
}
