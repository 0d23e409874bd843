//! Persistence Service
//!
//! Durable building blocks of the matching core:
//! - Append-only sequenced logs (in-memory and journal-backed) with
//!   independent blocking cursors
//! - Log fan-out: named readers driving observers in strict log order
//! - Latest-only per-product snapshots with integrity checks
//! - Checkpoint policy
//!
//! # Journal layout
//!
//! ```text
//! <dir>/journal-000000.bin   [len][offset][ts][kind][payload][crc32c] ...
//! <dir>/journal-000001.bin   (after rotation)
//! ```

pub mod fanout;
pub mod file_log;
pub mod journal;
pub mod log;
pub mod reader;
pub mod snapshot;

pub use fanout::{LogReader, Observer};
pub use file_log::FileLog;
pub use journal::{FlushPolicy, FsyncPolicy, JournalConfig};
pub use log::{LogCursor, LogError, LogRecord, MemoryLog, ReadFrom, SequencedLog};
pub use snapshot::{
    CheckpointPolicy, FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotError,
    SnapshotStore,
};
