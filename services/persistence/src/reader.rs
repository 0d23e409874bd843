//! Journal Reader: Segment scanner with corruption detection
//!
//! Features:
//! - Sequential reading of every journal segment in index order
//! - CRC32C checksum validation on every entry
//! - Torn-tail detection: a partial or corrupt frame at the end of the newest
//!   segment is what an interrupted append leaves behind; it is reported so the
//!   caller can truncate it
//! - Corruption anywhere else is an error
//! - Gapless offset validation
//! - Sparse offset index and [`JournalCursor`] for reading from any offset
//!   without loading the journal into memory

use crate::journal::{EntryPosition, JournalEntry, JournalError, JournalWriter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One index mark every this many offsets
pub const INDEX_STRIDE: u64 = 256;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Corruption in {file} at byte offset {byte_offset}: {detail}")]
    Corruption {
        file: PathBuf,
        byte_offset: u64,
        detail: String,
    },

    #[error("Offset gap: expected {expected}, got {got}")]
    OffsetGap { expected: u64, got: u64 },

    #[error("Offset {0} is not in the journal index")]
    NotIndexed(u64),
}

// ── Torn Tail ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CorruptionKind {
    ChecksumMismatch,
    TruncatedEntry,
}

/// Unreadable bytes at the end of the newest segment.
#[derive(Debug, Clone)]
pub struct TornTail {
    pub file: PathBuf,
    /// Length of the valid prefix of `file`
    pub valid_len: u64,
    /// Bytes after the valid prefix
    pub discarded: u64,
    pub kind: CorruptionKind,
}

// ── Index ───────────────────────────────────────────────────────────

/// Sparse offset → position map, one mark per [`INDEX_STRIDE`] entries.
#[derive(Debug, Clone, Default)]
pub struct JournalIndex {
    marks: Vec<(u64, EntryPosition)>,
}

impl JournalIndex {
    /// Note where `offset` was written. Only stride-aligned offsets are kept.
    pub fn record(&mut self, offset: u64, position: EntryPosition) {
        if offset % INDEX_STRIDE == 0 {
            self.marks.push((offset, position));
        }
    }

    /// Closest mark at or before `offset`.
    pub fn seek(&self, offset: u64) -> Option<(u64, EntryPosition)> {
        let idx = self.marks.partition_point(|(marked, _)| *marked <= offset);
        idx.checked_sub(1).map(|i| self.marks[i])
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Result of scanning a journal directory.
#[derive(Debug, Default)]
pub struct JournalScan {
    /// Number of valid entries; offsets run from 0 to `count - 1`
    pub count: u64,
    /// Newest valid entry
    pub last: Option<JournalEntry>,
    pub index: JournalIndex,
    pub torn_tail: Option<TornTail>,
}

// ── Journal Reader ──────────────────────────────────────────────────

pub struct JournalReader;

impl JournalReader {
    /// Validate every entry in `dir`, keeping only the newest one and the
    /// offset index.
    pub fn scan(dir: &Path) -> Result<JournalScan, ReaderError> {
        let files = Self::discover_files(dir)?;
        let mut scan = JournalScan::default();

        for (pos_in_list, (segment, path)) in files.iter().enumerate() {
            let is_last = pos_in_list + 1 == files.len();
            let file_len = fs::metadata(path)?.len();
            let mut reader = BufReader::new(File::open(path)?);
            let mut pos = 0u64;

            while pos < file_len {
                let failure = match JournalEntry::read_from(&mut reader) {
                    Ok(Some((entry, consumed))) if entry.verify_checksum() => {
                        if entry.offset != scan.count {
                            return Err(ReaderError::OffsetGap {
                                expected: scan.count,
                                got: entry.offset,
                            });
                        }
                        scan.index.record(
                            entry.offset,
                            EntryPosition {
                                segment: *segment,
                                byte_offset: pos,
                            },
                        );
                        scan.count += 1;
                        pos += consumed as u64;
                        scan.last = Some(entry);
                        continue;
                    }
                    Ok(Some((entry, _))) => (
                        CorruptionKind::ChecksumMismatch,
                        format!(
                            "CRC32C mismatch for offset={}, stored={:#010x}",
                            entry.offset, entry.checksum
                        ),
                    ),
                    Ok(None) => break,
                    Err(JournalError::Io(e)) => return Err(e.into()),
                    Err(e) => (CorruptionKind::TruncatedEntry, e.to_string()),
                };

                if !is_last {
                    return Err(ReaderError::Corruption {
                        file: path.clone(),
                        byte_offset: pos,
                        detail: failure.1,
                    });
                }
                scan.torn_tail = Some(TornTail {
                    file: path.clone(),
                    valid_len: pos,
                    discarded: file_len - pos,
                    kind: failure.0,
                });
                break;
            }
        }

        Ok(scan)
    }

    /// Cut a torn tail off its segment so appends continue from the valid prefix.
    pub fn truncate(tail: &TornTail) -> Result<(), ReaderError> {
        let file = OpenOptions::new().write(true).open(&tail.file)?;
        file.set_len(tail.valid_len)?;
        file.sync_all()?;
        Ok(())
    }

    fn discover_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>, ReaderError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let idx = JournalWriter::parse_index(&e.file_name().to_string_lossy())?;
                Some((idx, e.path()))
            })
            .collect();

        files.sort_by_key(|(idx, _)| *idx);
        Ok(files)
    }
}

// ── Cursor ──────────────────────────────────────────────────────────

/// Sequential reader over the segments, starting at any indexed offset.
///
/// Only reads entries that were already flushed; reaching the end of the
/// newest segment yields `None`.
pub struct JournalCursor {
    dir: PathBuf,
    segment: u64,
    byte_offset: u64,
    reader: BufReader<File>,
    next_offset: u64,
}

impl JournalCursor {
    /// Position a cursor so the first entry it returns is `offset`.
    pub fn open(dir: &Path, index: &JournalIndex, offset: u64) -> Result<Self, ReaderError> {
        let (marked, position) = index.seek(offset).ok_or(ReaderError::NotIndexed(offset))?;
        let path = JournalWriter::journal_path(dir, position.segment);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(position.byte_offset))?;

        let mut cursor = Self {
            dir: dir.to_path_buf(),
            segment: position.segment,
            byte_offset: position.byte_offset,
            reader: BufReader::new(file),
            next_offset: marked,
        };
        while cursor.next_offset < offset {
            if cursor.read_next()?.is_none() {
                return Err(ReaderError::NotIndexed(offset));
            }
        }
        Ok(cursor)
    }

    /// Offset of the entry `read_next` returns.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Next entry, moving on to the following segment at end of file.
    pub fn read_next(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        loop {
            let (entry, consumed) = match JournalEntry::read_from(&mut self.reader) {
                Ok(Some(read)) => read,
                Ok(None) => {
                    let next = JournalWriter::journal_path(&self.dir, self.segment + 1);
                    if !next.exists() {
                        return Ok(None);
                    }
                    self.reader = BufReader::new(File::open(next)?);
                    self.segment += 1;
                    self.byte_offset = 0;
                    continue;
                }
                Err(JournalError::Io(e)) => return Err(e.into()),
                Err(e) => return Err(self.corruption(e.to_string())),
            };

            if !entry.verify_checksum() {
                return Err(self.corruption(format!("CRC32C mismatch for offset={}", entry.offset)));
            }
            if entry.offset != self.next_offset {
                return Err(ReaderError::OffsetGap {
                    expected: self.next_offset,
                    got: entry.offset,
                });
            }
            self.byte_offset += consumed as u64;
            self.next_offset += 1;
            return Ok(Some(entry));
        }
    }

    fn corruption(&self, detail: String) -> ReaderError {
        ReaderError::Corruption {
            file: JournalWriter::journal_path(&self.dir, self.segment),
            byte_offset: self.byte_offset,
            detail,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
