//! Snapshot System: Latest-only book checkpoints with integrity and compression
//!
//! Features:
//! - One snapshot per product, atomically overwritten (write temp, fsync, rename)
//! - SHA-256 integrity hash over the snapshot contents
//! - Optional zstd compression
//! - Snapshot versioning for forward compatibility
//! - Checkpoint policy (every N commands and/or every D elapsed)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use types::ids::ProductId;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Snapshot for {found} stored under {expected}")]
    ProductMismatch { expected: ProductId, found: ProductId },

    #[error("Snapshot worker failed: {0}")]
    Worker(String),
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Checkpoint of one product's matching state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub product_id: ProductId,
    /// Serialized order book
    pub book_state: Vec<u8>,
    /// Last input offset whose events are reflected in `book_state`
    pub last_input_offset: Option<u64>,
    /// Sequence of the last event the book state accounts for
    pub last_sequence: u64,
    pub last_trade_seq: u64,
    /// Unix nanos of the last processed command
    pub time: i64,
    /// SHA-256 over every field above
    pub checksum: String,
}

impl Snapshot {
    pub fn new(
        product_id: ProductId,
        book_state: Vec<u8>,
        last_input_offset: Option<u64>,
        last_sequence: u64,
        last_trade_seq: u64,
        time: i64,
    ) -> Self {
        let mut snapshot = Self {
            version: SNAPSHOT_VERSION,
            product_id,
            book_state,
            last_input_offset,
            last_sequence,
            last_trade_seq,
            time,
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.compute_hash();
        snapshot
    }

    /// Input offset recovery resumes reading at.
    pub fn resume_offset(&self) -> u64 {
        self.last_input_offset.map_or(0, |offset| offset + 1)
    }

    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.product_id.as_str().as_bytes());
        hasher.update((self.book_state.len() as u64).to_le_bytes());
        hasher.update(&self.book_state);
        match self.last_input_offset {
            Some(offset) => {
                hasher.update([1u8]);
                hasher.update(offset.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.last_sequence.to_le_bytes());
        hasher.update(self.last_trade_seq.to_le_bytes());
        hasher.update(self.time.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_integrity(&self) -> bool {
        self.checksum == self.compute_hash()
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Latest-value snapshot storage keyed by product.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_latest(&self, product_id: &ProductId) -> Result<Option<Snapshot>, SnapshotError>;

    /// Replace the product's snapshot in one atomic step.
    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// Process-local snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<ProductId, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_latest(&self, product_id: &ProductId) -> Result<Option<Snapshot>, SnapshotError> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(product_id).cloned())
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(snapshot.product_id.clone(), snapshot.clone());
        Ok(())
    }
}

/// Snapshot files on disk, one per product.
///
/// File I/O runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    compress: bool,
}

impl FileSnapshotStore {
    /// `compress` enables zstd compression for new snapshots.
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    fn file_stem(product_id: &ProductId) -> String {
        product_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn path_for(&self, product_id: &ProductId, compressed: bool) -> PathBuf {
        let ext = if compressed { "snap.zst" } else { "snap" };
        self.dir.join(format!("{}.{}", Self::file_stem(product_id), ext))
    }

    fn load(path: &Path, compressed: bool) -> Result<Snapshot, SnapshotError> {
        let data = fs::read(path)?;
        let decoded = if compressed {
            zstd::decode_all(data.as_slice()).map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: Snapshot =
            bincode::deserialize(&decoded).map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        if !snapshot.verify_integrity() {
            return Err(SnapshotError::IntegrityFailure {
                expected: snapshot.checksum.clone(),
                actual: snapshot.compute_hash(),
            });
        }
        Ok(snapshot)
    }
}

impl FileSnapshotStore {
    fn read_latest(&self, product_id: &ProductId) -> Result<Option<Snapshot>, SnapshotError> {
        // The configured encoding is tried first; the other one covers a
        // restart with compression toggled.
        for compressed in [self.compress, !self.compress] {
            let path = self.path_for(product_id, compressed);
            if !path.exists() {
                continue;
            }
            let snapshot = Self::load(&path, compressed)?;
            if &snapshot.product_id != product_id {
                return Err(SnapshotError::ProductMismatch {
                    expected: product_id.clone(),
                    found: snapshot.product_id,
                });
            }
            return Ok(Some(snapshot));
        }
        Ok(None)
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data =
            bincode::serialize(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        let encoded = if self.compress {
            zstd::encode_all(data.as_slice(), 3).map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let path = self.path_for(&snapshot.product_id, self.compress);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        let stale = self.path_for(&snapshot.product_id, !self.compress);
        if stale.exists() {
            fs::remove_file(stale)?;
        }

        debug!(
            product = %snapshot.product_id,
            sequence = snapshot.last_sequence,
            bytes = encoded.len(),
            "Snapshot written"
        );
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get_latest(&self, product_id: &ProductId) -> Result<Option<Snapshot>, SnapshotError> {
        let store = self.clone();
        let product_id = product_id.clone();
        tokio::task::spawn_blocking(move || store.read_latest(&product_id))
            .await
            .map_err(|e| SnapshotError::Worker(e.to_string()))?
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let store = self.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || store.write(&snapshot))
            .await
            .map_err(|e| SnapshotError::Worker(e.to_string()))?
    }
}

// ── Checkpoint Policy ───────────────────────────────────────────────

/// Decides when the engine writes a new snapshot.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    /// Checkpoint after this many processed commands (0 disables)
    pub every_commands: u64,
    /// Checkpoint when this much time passed since the last one
    pub every_interval: Option<Duration>,
    commands_since: u64,
    last_checkpoint: Instant,
}

impl CheckpointPolicy {
    pub fn new(every_commands: u64, every_interval: Option<Duration>) -> Self {
        Self {
            every_commands,
            every_interval,
            commands_since: 0,
            last_checkpoint: Instant::now(),
        }
    }

    pub fn record_command(&mut self) {
        self.commands_since += 1;
    }

    /// True when at least one command is unsnapshotted and a trigger fired.
    pub fn should_checkpoint(&self) -> bool {
        if self.commands_since == 0 {
            return false;
        }
        let by_count = self.every_commands > 0 && self.commands_since >= self.every_commands;
        let by_time = self
            .every_interval
            .is_some_and(|interval| self.last_checkpoint.elapsed() >= interval);
        by_count || by_time
    }

    pub fn record_checkpoint(&mut self) {
        self.commands_since = 0;
        self.last_checkpoint = Instant::now();
    }

    /// Push the time trigger out by one interval after a failed checkpoint.
    pub fn defer(&mut self) {
        self.last_checkpoint = Instant::now();
    }

    /// When the time trigger fires, if anything is waiting to be snapshotted.
    pub fn deadline(&self) -> Option<Instant> {
        if self.commands_since == 0 {
            return None;
        }
        self.every_interval
            .map(|interval| self.last_checkpoint + interval)
    }

    pub fn pending_commands(&self) -> u64 {
        self.commands_since
    }
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::new(1_000, Some(Duration::from_secs(60)))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_snapshot(sequence: u64) -> Snapshot {
        Snapshot::new(
            ProductId::new("BTC-USDT"),
            vec![1, 2, 3, sequence as u8],
            Some(sequence * 2),
            sequence,
            sequence / 2,
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_snapshot_integrity() {
        let mut snapshot = sample_snapshot(10);
        assert!(snapshot.verify_integrity());
        snapshot.last_sequence = 11;
        assert!(!snapshot.verify_integrity());
    }

    #[test]
    fn test_resume_offset() {
        assert_eq!(sample_snapshot(3).resume_offset(), 7);
        let fresh = Snapshot::new(ProductId::new("BTC-USDT"), vec![], None, 0, 0, 0);
        assert_eq!(fresh.resume_offset(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_latest_only() {
        let store = MemorySnapshotStore::new();
        let product = ProductId::new("BTC-USDT");
        assert!(store.get_latest(&product).await.unwrap().is_none());

        store.put(&sample_snapshot(1)).await.unwrap();
        store.put(&sample_snapshot(2)).await.unwrap();
        let latest = store.get_latest(&product).await.unwrap().unwrap();
        assert_eq!(latest.last_sequence, 2);
    }

    #[tokio::test]
    async fn test_file_store_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(tmp.path(), false);
        let product = ProductId::new("BTC-USDT");

        store.put(&sample_snapshot(1)).await.unwrap();
        store.put(&sample_snapshot(5)).await.unwrap();

        let latest = store.get_latest(&product).await.unwrap().unwrap();
        assert_eq!(latest, sample_snapshot(5));
        let files = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_store_serves_concurrent_products() {
        let tmp = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(tmp.path(), true);

        let writes: Vec<_> = (0..8u64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let snapshot = Snapshot::new(
                        ProductId::new(format!("P{}-USDT", i)),
                        vec![i as u8; 64],
                        Some(i),
                        i + 1,
                        0,
                        0,
                    );
                    store.put(&snapshot).await
                })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        for i in 0..8u64 {
            let product = ProductId::new(format!("P{}-USDT", i));
            let latest = store.get_latest(&product).await.unwrap().unwrap();
            assert_eq!(latest.last_sequence, i + 1);
            assert_eq!(latest.book_state, vec![i as u8; 64]);
        }
    }

    #[tokio::test]
    async fn test_file_store_compression_toggle() {
        let tmp = TempDir::new().unwrap();
        let product = ProductId::new("BTC-USDT");

        FileSnapshotStore::new(tmp.path(), true)
            .put(&sample_snapshot(3))
            .await
            .unwrap();
        assert!(tmp.path().join("BTC-USDT.snap.zst").exists());

        let plain = FileSnapshotStore::new(tmp.path(), false);
        let loaded = plain.get_latest(&product).await.unwrap().unwrap();
        assert_eq!(loaded.last_sequence, 3);

        plain.put(&sample_snapshot(4)).await.unwrap();
        assert!(!tmp.path().join("BTC-USDT.snap.zst").exists());
        assert!(tmp.path().join("BTC-USDT.snap").exists());
    }

    #[tokio::test]
    async fn test_file_store_detects_corruption() {
        let tmp = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(tmp.path(), false);
        store.put(&sample_snapshot(1)).await.unwrap();

        let path = tmp.path().join("BTC-USDT.snap");
        let mut data = fs::read(&path).unwrap();
        let idx = data.len() - 80; // inside the trailing fixed-width fields
        data[idx] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let result = store.get_latest(&ProductId::new("BTC-USDT")).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_policy_triggers() {
        let mut policy = CheckpointPolicy::new(3, Some(Duration::from_secs(10)));
        assert!(!policy.should_checkpoint());

        policy.record_command();
        policy.record_command();
        assert!(!policy.should_checkpoint());
        policy.record_command();
        assert!(policy.should_checkpoint());

        policy.record_checkpoint();
        assert_eq!(policy.pending_commands(), 0);
        policy.record_command();
        assert!(!policy.should_checkpoint());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(policy.should_checkpoint());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_interval_does_not_checkpoint() {
        let policy = CheckpointPolicy::new(0, Some(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!policy.should_checkpoint());
        assert!(policy.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracks_pending_commands() {
        let start = Instant::now();
        let mut policy = CheckpointPolicy::new(0, Some(Duration::from_secs(10)));
        policy.record_command();
        assert_eq!(policy.deadline(), Some(start + Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;
        policy.defer();
        assert_eq!(policy.deadline(), Some(start + Duration::from_secs(14)));
        assert_eq!(policy.pending_commands(), 1);

        policy.record_checkpoint();
        assert!(policy.deadline().is_none());
    }
}
