//! Sequenced logs
//!
//! A [`SequencedLog`] is an append-only, strictly ordered, multi-reader log.
//! `append` returns the record's 0-based offset; `read` opens an independent
//! [`LogCursor`] that yields `(record, offset)` pairs in log order and suspends
//! once it reaches the tail instead of terminating.
//!
//! Both implementations share [`LogCore`]: a window of the most recent records
//! plus a `watch` channel carrying the committed length, which is what parked
//! cursors wait on. A record becomes visible only after the backing store
//! accepted it. The memory log keeps everything; the file log keeps a bounded
//! window and cursors that fall behind it read the journal segments instead.

use crate::journal::{EntryPosition, JournalEntry, JournalError};
use crate::reader::{JournalCursor, JournalIndex, ReaderError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;
use types::events::LogEvent;
use types::order::Command;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LogError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("journal read error: {0}")]
    Reader(#[from] ReaderError),

    #[error("record encoding error at offset {offset}: {reason}")]
    Encoding { offset: u64, reason: String },

    #[error("record at offset {0} left the window and the log has no journal")]
    Evicted(u64),

    #[error("journal worker failed: {0}")]
    Worker(String),

    #[error("log closed")]
    Closed,
}

// ── Records ─────────────────────────────────────────────────────────

/// Anything that can be stored in a sequenced log.
pub trait LogRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Short label stored alongside the encoded record
    fn kind(&self) -> &'static str;

    /// Unix nanos carried by the record
    fn timestamp(&self) -> i64;
}

impl LogRecord for LogEvent {
    fn kind(&self) -> &'static str {
        LogEvent::kind(self)
    }

    fn timestamp(&self) -> i64 {
        self.time()
    }
}

impl LogRecord for Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::Place(_) => "place",
            Command::Cancel(_) => "cancel",
        }
    }

    fn timestamp(&self) -> i64 {
        self.time()
    }
}

/// Where a new cursor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// First record delivered is the one at this offset (0 replays everything)
    Offset(u64),
    /// Only records appended after the cursor was opened
    Tail,
}

impl ReadFrom {
    /// Beginning of the log.
    pub const START: ReadFrom = ReadFrom::Offset(0);

    /// Interpret the conventional signed start offset: `-1` is tail mode.
    pub fn from_raw(offset: i64) -> Self {
        match u64::try_from(offset) {
            Ok(offset) => ReadFrom::Offset(offset),
            Err(_) => ReadFrom::Tail,
        }
    }
}

// ── Trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait SequencedLog<T: LogRecord>: Send + Sync {
    /// Commit `record` and return its offset.
    async fn append(&self, record: T) -> Result<u64, LogError>;

    /// Open an independent cursor.
    fn read(&self, from: ReadFrom) -> LogCursor<T>;

    /// Number of committed records.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent record and its offset.
    fn last(&self) -> Option<(T, u64)>;
}

// ── Shared core ─────────────────────────────────────────────────────

/// Journal segments holding the records that left the window.
pub(crate) struct ColdStore {
    dir: PathBuf,
    index: RwLock<JournalIndex>,
}

impl ColdStore {
    pub(crate) fn new(dir: PathBuf, index: JournalIndex) -> Self {
        Self {
            dir,
            index: RwLock::new(index),
        }
    }

    fn open(&self, offset: u64) -> Result<JournalCursor, LogError> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        Ok(JournalCursor::open(&self.dir, &index, offset)?)
    }
}

struct Window<T> {
    /// Offset of `records[0]`
    start: u64,
    records: VecDeque<T>,
    /// `None` keeps every record
    capacity: Option<usize>,
    /// Newest record from before the window, restored on open
    before: Option<T>,
}

impl<T> Window<T> {
    fn len(&self) -> u64 {
        self.start + self.records.len() as u64
    }
}

enum Lookup<T> {
    Hot(T),
    Cold,
    Pending,
}

pub(crate) struct LogCore<T> {
    window: RwLock<Window<T>>,
    committed: watch::Sender<u64>,
    cold: Option<ColdStore>,
}

impl<T: LogRecord> LogCore<T> {
    /// Unbounded core holding every record in memory.
    pub(crate) fn in_memory() -> Arc<Self> {
        let (committed, _) = watch::channel(0);
        Arc::new(Self {
            window: RwLock::new(Window {
                start: 0,
                records: VecDeque::new(),
                capacity: None,
                before: None,
            }),
            committed,
            cold: None,
        })
    }

    /// Core over a journal already holding `len` records, the newest being
    /// `last`. The window starts empty.
    pub(crate) fn journaled(len: u64, last: Option<T>, capacity: usize, cold: ColdStore) -> Arc<Self> {
        let (committed, _) = watch::channel(len);
        Arc::new(Self {
            window: RwLock::new(Window {
                start: len,
                records: VecDeque::with_capacity(capacity.min(1_024)),
                capacity: Some(capacity.max(1)),
                before: last,
            }),
            committed,
            cold: Some(cold),
        })
    }

    /// Publish a record that the backing store already accepted.
    pub(crate) fn push(&self, record: T, position: Option<EntryPosition>) -> u64 {
        let mut window = self.window.write().unwrap_or_else(PoisonError::into_inner);
        let offset = window.len();
        if let (Some(cold), Some(position)) = (&self.cold, position) {
            cold.index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .record(offset, position);
        }
        window.records.push_back(record);
        if let Some(capacity) = window.capacity {
            while window.records.len() > capacity {
                window.before = window.records.pop_front();
                window.start += 1;
            }
        }
        let len = window.len();
        drop(window);
        self.committed.send_replace(len);
        offset
    }

    fn lookup(&self, offset: u64) -> Lookup<T> {
        let window = self.window.read().unwrap_or_else(PoisonError::into_inner);
        if offset < window.start {
            return Lookup::Cold;
        }
        usize::try_from(offset - window.start)
            .ok()
            .and_then(|i| window.records.get(i).cloned())
            .map_or(Lookup::Pending, Lookup::Hot)
    }

    pub(crate) fn len(&self) -> u64 {
        self.window.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn last(&self) -> Option<(T, u64)> {
        let window = self.window.read().unwrap_or_else(PoisonError::into_inner);
        let last = window.records.back().or(window.before.as_ref())?.clone();
        Some((last, window.len() - 1))
    }

    /// Records currently held in memory.
    pub(crate) fn resident(&self) -> usize {
        self.window.read().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    pub(crate) fn cursor(self: &Arc<Self>, from: ReadFrom) -> LogCursor<T> {
        // Subscribe before sampling the length so no append slips in between.
        let committed = self.committed.subscribe();
        let next = match from {
            ReadFrom::Offset(offset) => offset,
            ReadFrom::Tail => self.len(),
        };
        LogCursor {
            core: Arc::clone(self),
            next,
            committed,
            cold: None,
        }
    }
}

/// Decode a journal entry back into its record.
pub(crate) fn decode_entry<T: LogRecord>(entry: &JournalEntry) -> Result<T, LogError> {
    bincode::deserialize(&entry.payload).map_err(|e| LogError::Encoding {
        offset: entry.offset,
        reason: e.to_string(),
    })
}

// ── Cursor ──────────────────────────────────────────────────────────

/// Independent read position over a log.
pub struct LogCursor<T> {
    core: Arc<LogCore<T>>,
    next: u64,
    committed: watch::Receiver<u64>,
    /// Open while reading records older than the window
    cold: Option<JournalCursor>,
}

impl<T: LogRecord> LogCursor<T> {
    /// Next record in log order, waiting for it to be appended if needed.
    pub async fn next(&mut self) -> Result<(T, u64), LogError> {
        loop {
            if let Some(record) = self.poll_next()? {
                return Ok(record);
            }
            self.committed.changed().await.map_err(|_| LogError::Closed)?;
        }
    }

    /// Next record if one is already committed.
    pub fn poll_next(&mut self) -> Result<Option<(T, u64)>, LogError> {
        let record = match self.core.lookup(self.next) {
            Lookup::Pending => return Ok(None),
            Lookup::Hot(record) => {
                self.cold = None;
                record
            }
            Lookup::Cold => self.read_cold()?,
        };
        let offset = self.next;
        self.next += 1;
        Ok(Some((record, offset)))
    }

    /// Like [`poll_next`](Self::poll_next), logging a failed journal read
    /// and reporting it as no record.
    pub fn try_next(&mut self) -> Option<(T, u64)> {
        self.poll_next().unwrap_or_else(|e| {
            warn!(offset = self.next, error = %e, "Log read failed");
            None
        })
    }

    fn read_cold(&mut self) -> Result<T, LogError> {
        let next = self.next;
        let store = self.core.cold.as_ref().ok_or(LogError::Evicted(next))?;
        if self.cold.as_ref().map_or(true, |c| c.next_offset() != next) {
            self.cold = Some(store.open(next)?);
        }
        let cursor = self.cold.as_mut().ok_or(LogError::Evicted(next))?;
        let entry = cursor.read_next()?.ok_or(LogError::Evicted(next))?;
        decode_entry(&entry)
    }

    /// Offset of the record `next` will return.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Whether every committed record has been consumed.
    pub fn is_caught_up(&self) -> bool {
        self.next >= self.core.len()
    }
}

// ── Memory log ──────────────────────────────────────────────────────

/// Process-local log.
pub struct MemoryLog<T> {
    core: Arc<LogCore<T>>,
}

impl<T: LogRecord> MemoryLog<T> {
    pub fn new() -> Self {
        Self {
            core: LogCore::in_memory(),
        }
    }
}

impl<T: LogRecord> Default for MemoryLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: LogRecord> SequencedLog<T> for MemoryLog<T> {
    async fn append(&self, record: T) -> Result<u64, LogError> {
        Ok(self.core.push(record, None))
    }

    fn read(&self, from: ReadFrom) -> LogCursor<T> {
        self.core.cursor(from)
    }

    fn len(&self) -> u64 {
        self.core.len()
    }

    fn last(&self) -> Option<(T, u64)> {
        self.core.last()
    }
}
