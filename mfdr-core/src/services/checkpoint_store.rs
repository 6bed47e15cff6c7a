//! Checkpoint persistence
//!
//! One record per scan key. The file store writes a temp file and renames it
//! over the previous record, so a crash mid-write leaves the last good
//! checkpoint in place. Writers are serialized by a mutex.

use crate::error::CheckpointError;
use crate::models::ScanCheckpoint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Storage for scan checkpoints keyed by scan identifier
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored checkpoint for `scan_key`, if any
    async fn load(&self, scan_key: &str) -> Result<Option<ScanCheckpoint>, CheckpointError>;

    async fn save(&self, scan_key: &str, checkpoint: &ScanCheckpoint) -> Result<(), CheckpointError>;

    /// Remove the record for `scan_key`; absent records are not an error
    async fn clear(&self, scan_key: &str) -> Result<(), CheckpointError>;
}

fn verify_key(scan_key: &str, checkpoint: ScanCheckpoint) -> Result<ScanCheckpoint, CheckpointError> {
    if checkpoint.scan_key != scan_key {
        return Err(CheckpointError::KeyMismatch {
            expected: scan_key.to_string(),
            found: checkpoint.scan_key,
        });
    }
    Ok(checkpoint)
}

// ============================================================================
// JSON files
// ============================================================================

/// Checkpoints as `scan_<key>.json` files in a state folder
pub struct JsonCheckpointStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, scan_key: &str) -> PathBuf {
        let safe: String = scan_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("scan_{}.json", safe))
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn load(&self, scan_key: &str) -> Result<Option<ScanCheckpoint>, CheckpointError> {
        let path = self.path_for(scan_key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint: ScanCheckpoint = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            processed = checkpoint.processed_count(),
            "Loaded checkpoint"
        );
        verify_key(scan_key, checkpoint).map(Some)
    }

    async fn save(&self, scan_key: &str, checkpoint: &ScanCheckpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let path = self.path_for(scan_key);
        let temp_path = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(
            path = %path.display(),
            processed = checkpoint.processed_count(),
            "Saved checkpoint"
        );
        Ok(())
    }

    async fn clear(&self, scan_key: &str) -> Result<(), CheckpointError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(scan_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Store keeping serialized checkpoints in memory
///
/// Records go through JSON like the file store, so what is loaded back is
/// exactly what a file would have held.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, String>>,
    saves: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, scan_key: &str) -> Result<Option<ScanCheckpoint>, CheckpointError> {
        let records = self.records.lock().await;
        match records.get(scan_key) {
            Some(json) => {
                let checkpoint: ScanCheckpoint = serde_json::from_str(json)?;
                verify_key(scan_key, checkpoint).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, scan_key: &str, checkpoint: &ScanCheckpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(checkpoint)?;
        self.records.lock().await.insert(scan_key.to_string(), json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, scan_key: &str) -> Result<(), CheckpointError> {
        self.records.lock().await.remove(scan_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanMode;
    use tempfile::TempDir;

    fn sample(key: &str) -> ScanCheckpoint {
        let mut checkpoint = ScanCheckpoint::new(key, ScanMode::Corruption);
        checkpoint.mark_processed("/music/a.mp3");
        checkpoint.statistics.checked = 1;
        checkpoint.statistics.good = 1;
        checkpoint
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCheckpointStore::new(temp_dir.path().join("state"));

        assert!(store.load("abc").await.unwrap().is_none());
        store.save("abc", &sample("abc")).await.unwrap();

        let loaded = store.load("abc").await.unwrap().unwrap();
        assert_eq!(loaded, sample("abc"));
        assert!(!store.path_for("abc").with_extension("json.tmp").exists());

        store.clear("abc").await.unwrap();
        assert!(store.load("abc").await.unwrap().is_none());
        store.clear("abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_json_store_rejects_foreign_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCheckpointStore::new(temp_dir.path());
        std::fs::write(
            store.path_for("abc"),
            serde_json::to_string(&sample("other")).unwrap(),
        )
        .unwrap();

        let result = store.load("abc").await;
        assert!(matches!(result, Err(CheckpointError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn test_json_store_corrupt_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCheckpointStore::new(temp_dir.path());
        std::fs::write(store.path_for("abc"), "{ not json").unwrap();

        assert!(matches!(
            store.load("abc").await,
            Err(CheckpointError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryCheckpointStore::new();
        store.save("k", &sample("k")).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(sample("k")));
        assert_eq!(store.save_count(), 1);
        assert!(store.load("other").await.unwrap().is_none());
    }
}
