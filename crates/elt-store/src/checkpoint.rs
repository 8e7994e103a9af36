//! Checkpoint store implementations.

use async_trait::async_trait;
use elt_core::{CheckpointRecord, CheckpointStore, EltError, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Checkpoint store keeping one JSON document per location on disk.
///
/// Writes go to `<location>.tmp`, are synced, then renamed over the target,
/// so a reader never observes a partially written checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileCheckpointStore {
    pretty: bool,
}

impl JsonFileCheckpointStore {
    /// Create a store writing compact JSON.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Write indented JSON instead.
    #[must_use]
    pub const fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Sibling path used for the write-then-rename.
    fn temp_path(location: &Path) -> PathBuf {
        let mut name = OsString::from(location.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn encode(&self, record: &CheckpointRecord) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(record)
        } else {
            serde_json::to_vec(record)
        };
        encoded.map_err(|e| EltError::Checkpoint(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    #[instrument(skip(self), fields(location = %location.display()))]
    async fn read(&self, location: &Path) -> Result<Option<CheckpointRecord>> {
        let bytes = match tokio::fs::read(location).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No checkpoint found");
                return Ok(None);
            }
            Err(e) => return Err(EltError::Checkpoint(e.to_string())),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| EltError::Checkpoint(format!("corrupt checkpoint: {e}")))
    }

    #[instrument(skip(self, record), fields(location = %location.display(), processed = record.processed.len()))]
    async fn write(&self, location: &Path, record: &CheckpointRecord) -> Result<()> {
        let bytes = self.encode(record)?;

        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EltError::Checkpoint(e.to_string()))?;
        }

        let temp = Self::temp_path(location);
        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, location).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(EltError::Checkpoint(format!("atomic write failed: {e}")));
        }

        debug!("Checkpoint written");
        Ok(())
    }

    #[instrument(skip(self), fields(location = %location.display()))]
    async fn remove(&self, location: &Path) -> Result<()> {
        match tokio::fs::remove_file(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EltError::Checkpoint(e.to_string())),
        }
    }
}

/// Checkpoint store held in memory, for tests.
///
/// Records are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    records: RwLock<HashMap<PathBuf, CheckpointRecord>>,
    writes: AtomicUsize,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record currently stored at `location`.
    pub async fn snapshot(&self, location: &Path) -> Option<CheckpointRecord> {
        self.records.read().await.get(location).cloned()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn read(&self, location: &Path) -> Result<Option<CheckpointRecord>> {
        Ok(self.snapshot(location).await)
    }

    async fn write(&self, location: &Path, record: &CheckpointRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(location.to_path_buf(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, location: &Path) -> Result<()> {
        self.records.write().await.remove(location);
        Ok(())
    }
}
