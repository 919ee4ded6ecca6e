//! Evidence record persistence.
//!
//! The orchestrator only needs create / get / update-by-id. Updates are
//! field-level: a patch is applied to the latest stored document under an
//! exclusive lock, so concurrent narration and analysis writes to the same
//! record never clobber each other.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{EvidenceRecord, NewRecord, RecordId, RecordPatch};

/// Errors from a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Document store for evidence records, keyed by opaque id
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new sealed record and assign its id
    async fn create(&self, record: NewRecord) -> Result<RecordId, StoreError>;

    /// Look up a record; `Ok(None)` when the id is unknown
    async fn get(&self, id: RecordId) -> Result<Option<EvidenceRecord>, StoreError>;

    /// Apply a field-level patch and return the updated record
    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<EvidenceRecord, StoreError>;
}

/// One JSON document per record on disk
pub struct FileRecordStore {
    /// Directory holding `<id>.json` documents
    records_dir: PathBuf,
}

impl FileRecordStore {
    /// Open (and create if needed) a store rooted at `records_dir`
    pub async fn open(records_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let records_dir = records_dir.into();
        tokio::fs::create_dir_all(&records_dir).await?;
        Ok(Self { records_dir })
    }

    /// Open the store at the configured location
    pub async fn open_default() -> anyhow::Result<Self> {
        let dir = crate::config::records_dir()?;
        Ok(Self::open(dir).await?)
    }

    /// Directory holding the record documents
    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.records_dir.join(format!("{}.json", id))
    }

    fn lock_path(&self, id: RecordId) -> PathBuf {
        self.records_dir.join(format!("{}.lock", id))
    }

    /// List records, most recently sealed first
    pub async fn list(&self, limit: usize) -> Result<Vec<EvidenceRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.records_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().map(|e| e == "json").unwrap_or(false);
            if !is_record {
                continue;
            }

            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<EvidenceRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                }
            }
        }

        records.sort_by(|a, b| b.sealed_at.cmp(&a.sealed_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn create(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        let document = EvidenceRecord::from_new(id, record);
        let dir = self.records_dir.clone();
        let path = self.record_path(id);

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &document))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Option<EvidenceRecord>, StoreError> {
        let path = self.record_path(id);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<EvidenceRecord, StoreError> {
        let dir = self.records_dir.clone();
        let path = self.record_path(id);
        let lock_path = self.lock_path(id);

        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Err(StoreError::NotFound(id));
            }

            let lock = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&lock_path)?;
            lock.lock_exclusive()?;

            // Re-read under the lock so the patch lands on the latest version
            let mut content = String::new();
            File::open(&path)?.read_to_string(&mut content)?;
            let mut record: EvidenceRecord = serde_json::from_str(&content)?;

            patch.apply(&mut record);
            write_atomic(&dir, &path, &record)?;

            // Lock is released when `lock` is dropped
            Ok(record)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Write a record via temp file + rename so readers never see half a document
fn write_atomic(dir: &Path, path: &Path, record: &EvidenceRecord) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(record)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    Ok(())
}

/// In-process store for ephemeral serving and tests
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<RecordId, EvidenceRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.records
            .lock()
            .await
            .insert(id, EvidenceRecord::from_new(id, record));
        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Option<EvidenceRecord>, StoreError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<EvidenceRecord, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        patch.apply(record);
        Ok(record.clone())
    }
}
