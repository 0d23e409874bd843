//! Durable sequenced log on top of the journal
//!
//! On open the journal directory is scanned, a torn tail left by an interrupted
//! append is truncated, and only the newest record is decoded. Memory holds the
//! window of recent records configured by `window_records` plus a sparse offset
//! index; cursors reading older records stream them from the segments.
//!
//! Appends are serialized by the writer lock and run on the blocking pool, so
//! an fsync never stalls a runtime worker. A record is published to readers
//! only after the journal write returned.

use crate::journal::{FlushPolicy, JournalConfig, JournalEntry, JournalWriter};
use crate::log::{decode_entry, ColdStore, LogCore, LogCursor, LogError, LogRecord, ReadFrom, SequencedLog};
use crate::reader::JournalReader;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub struct FileLog<T> {
    core: Arc<LogCore<T>>,
    writer: Arc<Mutex<JournalWriter>>,
}

impl<T: LogRecord> FileLog<T> {
    /// Open (or create) the log stored in `config.dir`.
    pub fn open(config: JournalConfig) -> Result<Self, LogError> {
        let scan = JournalReader::scan(&config.dir)?;

        if let Some(tail) = &scan.torn_tail {
            warn!(
                file = %tail.file.display(),
                valid_len = tail.valid_len,
                discarded = tail.discarded,
                kind = ?tail.kind,
                "Truncating torn journal tail"
            );
            JournalReader::truncate(tail)?;
        }

        let last = scan.last.as_ref().map(decode_entry::<T>).transpose()?;

        // Records leaving the window must already be flushed for cold reads.
        let window = match config.flush_policy {
            FlushPolicy::EveryWrite => config.window_records,
            FlushPolicy::EveryN(n) => config.window_records.max(n + 1),
        };

        info!(
            dir = %config.dir.display(),
            records = scan.count,
            index_marks = scan.index.len(),
            window,
            "Opened file log"
        );

        let cold = ColdStore::new(config.dir.clone(), scan.index);
        let writer = JournalWriter::open(config, scan.count)?;
        Ok(Self {
            core: LogCore::journaled(scan.count, last, window, cold),
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    /// Open with durable defaults in `dir`.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        Self::open(JournalConfig::new(dir.as_ref()))
    }

    /// Force buffered entries to disk.
    pub fn sync(&self) -> Result<(), LogError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.sync()?;
        Ok(())
    }

    /// Records currently decoded in memory.
    pub fn resident_records(&self) -> usize {
        self.core.resident()
    }
}

#[async_trait]
impl<T: LogRecord> SequencedLog<T> for FileLog<T> {
    async fn append(&self, record: T) -> Result<u64, LogError> {
        let core = Arc::clone(&self.core);
        let writer = Arc::clone(&self.writer);

        tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let offset = writer.next_offset();
            let payload = bincode::serialize(&record).map_err(|e| LogError::Encoding {
                offset,
                reason: e.to_string(),
            })?;
            let entry = JournalEntry::new(offset, record.timestamp(), record.kind(), payload);
            let position = writer.append(&entry)?;
            // Publish under the writer lock so offsets reach readers in order.
            let published = core.push(record, Some(position));
            debug_assert_eq!(published, offset);
            Ok(offset)
        })
        .await
        .map_err(|e| LogError::Worker(e.to_string()))?
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
