//! Journal Writer: Append-only record journal with checksums
//!
//! Backing storage for [`FileLog`](crate::file_log::FileLog). Each record of a
//! sequenced log is one entry; the entry offset is the record's 0-based log
//! offset.
//!
//! # Binary Format (per entry)
//! ```text
//! [total_len: u32]
//! [offset:    u64]
//! [timestamp: i64]
//! [kind_len: u16][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum: u32]  // CRC32C over offset+timestamp+kind+payload
//! ```

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Offset error: expected {expected}, got {got}")]
    OffsetError { expected: u64, got: u64 },
}

// ── Journal Entry ───────────────────────────────────────────────────

/// A single journal entry holding one encoded log record.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// 0-based position of the record in its log
    pub offset: u64,
    /// Unix nanosecond timestamp carried by the record
    pub timestamp: i64,
    /// Record kind label, kept for inspection tooling
    pub kind: String,
    /// Bincode-serialized record
    pub payload: Vec<u8>,
    /// CRC32C checksum over (offset ++ timestamp ++ kind ++ payload)
    pub checksum: u32,
}

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum automatically.
    pub fn new(offset: u64, timestamp: i64, kind: impl Into<String>, payload: Vec<u8>) -> Self {
        let kind = kind.into();
        let checksum = Self::compute_checksum(offset, timestamp, &kind, &payload);
        Self {
            offset,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(offset: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(8 + 8 + kind.len() + payload.len());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    /// Validate the stored checksum against recomputed value.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.offset, self.timestamp, &self.kind, &self.payload)
    }

    /// Serialize entry to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let kind_bytes = self.kind.as_bytes();
        let kind_len = kind_bytes.len() as u16;
        let payload_len = self.payload.len() as u32;

        // total_len = 8 (offset) + 8 (ts) + 2 (kind_len) + kind + 4 (pl_len) + pl + 4 (crc)
        let body_len: u32 = 8 + 8 + 2 + u32::from(kind_len) + 4 + payload_len + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&kind_len.to_le_bytes());
        buf.extend_from_slice(kind_bytes);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize entry from the binary wire format.
    ///
    /// Returns `(entry, bytes_consumed)` on success. Short or malformed input
    /// is an error, never a panic.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let body_len = read_u32(data, 0)? as usize;

        // Reject absurdly large body_len (likely corruption)
        if body_len > 100_000_000 {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {} (likely corruption)",
                body_len
            )));
        }
        // Minimum body: 8 + 8 + 2 + 0 + 4 + 0 + 4
        if body_len < 26 {
            return Err(JournalError::Serialization(format!(
                "Body too small: {} bytes, minimum is 26",
                body_len
            )));
        }

        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Serialization(format!(
                "Incomplete entry: need {} bytes, have {}",
                total,
                data.len()
            )));
        }

        let body = &data[4..total];
        let mut pos = 0usize;

        let offset = read_u64(body, pos)?;
        pos += 8;
        let timestamp = read_u64(body, pos)? as i64;
        pos += 8;

        let kind_len = read_u16(body, pos)? as usize;
        pos += 2;
        let kind_bytes = slice(body, pos, kind_len)?;
        let kind = String::from_utf8(kind_bytes.to_vec())
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        pos += kind_len;

        let payload_len = read_u32(body, pos)? as usize;
        pos += 4;
        let payload = slice(body, pos, payload_len)?.to_vec();
        pos += payload_len;

        let checksum = read_u32(body, pos)?;

        Ok((
            Self {
                offset,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

impl JournalEntry {
    /// Read the next frame from a stream.
    ///
    /// `Ok(None)` means the stream ended exactly on a frame boundary; a frame
    /// cut short is an error.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<(Self, usize)>, JournalError> {
        let mut len_raw = [0u8; 4];
        let got = read_full(reader, &mut len_raw)?;
        if got == 0 {
            return Ok(None);
        }
        if got < len_raw.len() {
            return Err(JournalError::Serialization(format!(
                "Incomplete length prefix: {} of 4 bytes",
                got
            )));
        }

        let body_len = u32::from_le_bytes(len_raw) as usize;
        if !(26..=100_000_000).contains(&body_len) {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {}",
                body_len
            )));
        }

        let mut frame = Vec::with_capacity(4 + body_len);
        frame.extend_from_slice(&len_raw);
        frame.resize(4 + body_len, 0);
        let got = read_full(reader, &mut frame[4..])?;
        if got < body_len {
            return Err(JournalError::Serialization(format!(
                "Incomplete entry: need {} body bytes, have {}",
                body_len, got
            )));
        }
        Self::from_bytes(&frame).map(Some)
    }
}

/// Fill `buf` as far as the stream allows; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn slice(data: &[u8], pos: usize, len: usize) -> Result<&[u8], JournalError> {
    data.get(pos..pos + len).ok_or_else(|| {
        JournalError::Serialization(format!(
            "field of {} bytes at {} exceeds entry ({} bytes)",
            len,
            pos,
            data.len()
        ))
    })
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, JournalError> {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(slice(data, pos, 2)?);
    Ok(u16::from_le_bytes(raw))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32, JournalError> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(slice(data, pos, 4)?);
    Ok(u32::from_le_bytes(raw))
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64, JournalError> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice(data, pos, 8)?);
    Ok(u64::from_le_bytes(raw))
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    /// Flush after every write.
    EveryWrite,
    /// Flush every N writes.
    EveryN(usize),
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync after every write.
    EveryWrite,
    /// Fsync every N writes.
    EveryN(usize),
    /// Fsync only on file rotation.
    OnRotation,
}

// ── Journal Writer Configuration ────────────────────────────────────

/// Configuration for the journal writer.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal segment files.
    pub dir: PathBuf,
    /// Maximum segment size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
    /// Most recent records a `FileLog` keeps decoded in memory; older ones
    /// are read back from the segments.
    pub window_records: usize,
}

impl JournalConfig {
    /// Create a config with durable defaults.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
            window_records: 4_096,
        }
    }
}

/// Where an entry starts on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPosition {
    /// Segment file index (`journal-<segment>.bin`)
    pub segment: u64,
    /// Byte offset of the frame inside the segment
    pub byte_offset: u64,
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only journal writer with checksums, rotation, and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_offset: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
}

impl JournalWriter {
    /// Open a journal writer positioned after `next_offset - 1`, creating the
    /// directory if needed.
    pub fn open(config: JournalConfig, next_offset: u64) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = Self::find_latest_index(&config.dir);
        let current_file = Self::journal_path(&config.dir, file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_offset,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
        })
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append a journal entry and return where it was written. Offsets must
    /// be contiguous.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<EntryPosition, JournalError> {
        if entry.offset != self.next_offset {
            return Err(JournalError::OffsetError {
                expected: self.next_offset,
                got: entry.offset,
            });
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let position = EntryPosition {
            segment: self.file_index,
            byte_offset: self.current_file_size,
        };
        let bytes = entry.to_bytes();
        self.writer.write_all(&bytes)?;

        self.current_file_size += bytes.len() as u64;
        self.next_offset = entry.offset + 1;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()?;

        Ok(position)
    }

    /// Force flush + fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn apply_flush_policy(&mut self) -> Result<(), JournalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if should_flush {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = Self::journal_path(&self.config.dir, self.file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;

        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }

    pub(crate) fn journal_path(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("journal-{:06}.bin", index))
    }

    pub(crate) fn parse_index(name: &str) -> Option<u64> {
        name.strip_prefix("journal-")?
            .strip_suffix(".bin")?
            .parse::<u64>()
            .ok()
    }

    fn find_latest_index(dir: &Path) -> u64 {
        fs::read_dir(dir)
            .ok()
            .and_then(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| Self::parse_index(&e.file_name().to_string_lossy()))
                    .max()
            })
            .unwrap_or(0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
