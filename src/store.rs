//! Reading store — the locally persisted collection of past readings.
//!
//! DESIGN
//! ======
//! The whole collection lives in one named slot (`pastReadings`) as a JSON
//! array and is rewritten after every mutation. Loading is forgiving: a
//! missing or corrupt slot reads as empty, and incomplete records are
//! dropped. Writing is strict: a mutation is applied to a copy, persisted,
//! and only then committed to memory, so the two views never diverge.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::{info, warn};

use crate::image::DataUrl;

pub const READINGS_SLOT: &str = "pastReadings";

/// `2024-05-01T09:30:00.000Z`, millisecond precision in UTC.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("slot read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("slot write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("collection encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("record is missing {0}")]
    IncompleteRecord(&'static str),
    #[error("no reading at position {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("timestamp format failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl crate::error::ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read(_) => "E_STORE_READ",
            Self::Write(_) => "E_STORE_WRITE",
            Self::Encode(_) => "E_STORE_ENCODE",
            Self::IncompleteRecord(_) => "E_STORE_INCOMPLETE",
            Self::IndexOutOfRange { .. } => "E_STORE_INDEX",
            Self::Timestamp(_) => "E_STORE_TIMESTAMP",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One completed reading: the image it was made from, when, and the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingRecord {
    #[serde(rename = "imageData")]
    pub image: String,
    pub timestamp: String,
    #[serde(rename = "reading")]
    pub text: String,
}

impl ReadingRecord {
    /// Stamp a new record with the current UTC time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Timestamp`] if the clock value cannot be
    /// formatted.
    pub fn now(image: &DataUrl, text: impl Into<String>) -> Result<Self, StorageError> {
        Self::at(image, text, OffsetDateTime::now_utc())
    }

    /// # Errors
    ///
    /// Returns [`StorageError::Timestamp`] if `at` cannot be formatted.
    pub fn at(image: &DataUrl, text: impl Into<String>, at: OffsetDateTime) -> Result<Self, StorageError> {
        let timestamp = at.to_offset(time::UtcOffset::UTC).format(TIMESTAMP_FORMAT)?;
        Ok(Self { image: image.as_str().to_string(), timestamp, text: text.into() })
    }

    /// Name of the first empty field, if any.
    fn missing_field(&self) -> Option<&'static str> {
        if self.image.is_empty() {
            Some("imageData")
        } else if self.timestamp.is_empty() {
            Some("timestamp")
        } else if self.text.trim().is_empty() {
            Some("reading")
        } else {
            None
        }
    }
}

/// Why a persisted entry was not surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    /// Field absent, null, not a string, or empty.
    Missing(&'static str),
}

/// Typed decode of one persisted entry.
///
/// # Errors
///
/// Returns the [`Rejection`] that disqualifies the entry.
pub fn decode_record(value: &Value) -> Result<ReadingRecord, Rejection> {
    let object = value.as_object().ok_or(Rejection::NotAnObject)?;
    let field = |name: &'static str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or(Rejection::Missing(name))
    };
    Ok(ReadingRecord { image: field("imageData")?, timestamp: field("timestamp")?, text: field("reading")? })
}

/// Decode a whole slot, keeping complete records in order. Anything that is
/// not a JSON array decodes to an empty collection.
#[must_use]
pub fn decode_collection(raw: &str) -> Vec<ReadingRecord> {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!(slot = READINGS_SLOT, "store: persisted value is not an array, treating as empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(slot = READINGS_SLOT, error = %e, "store: persisted value is corrupt, treating as empty");
            return Vec::new();
        }
    };

    let total = entries.len();
    let records: Vec<ReadingRecord> = entries
        .iter()
        .filter_map(|entry| match decode_record(entry) {
            Ok(record) => Some(record),
            Err(rejection) => {
                warn!(?rejection, "store: skipping incomplete record");
                None
            }
        })
        .collect();
    if records.len() < total {
        info!(kept = records.len(), dropped = total - records.len(), "store: filtered incomplete records");
    }
    records
}

// =============================================================================
// SLOT BACKENDS
// =============================================================================

/// Key/value storage for whole serialized collections.
#[async_trait::async_trait]
pub trait SlotBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One `<key>.json` file per slot under a data directory.
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait::async_trait]
impl SlotBackend for FileSlots {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read(e)),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(StorageError::Write)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        tokio::fs::write(&tmp, value).await.map_err(StorageError::Write)?;
        tokio::fs::rename(&tmp, &path).await.map_err(StorageError::Write)?;
        Ok(())
    }
}

/// Process-local slots, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySlots {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SlotBackend for MemorySlots {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Store shared between the capture workflow and the gallery.
pub type SharedStore = Arc<tokio::sync::Mutex<ReadingStore>>;

pub struct ReadingStore {
    backend: Arc<dyn SlotBackend>,
    records: Vec<ReadingRecord>,
}

impl ReadingStore {
    /// Load the persisted collection. Never fails: unreadable or corrupt
    /// storage is logged and yields an empty store.
    pub async fn load(backend: Arc<dyn SlotBackend>) -> Self {
        let records = match backend.read(READINGS_SLOT).await {
            Ok(Some(raw)) => decode_collection(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "store: read failed, treating as empty");
                Vec::new()
            }
        };
        info!(count = records.len(), "store: loaded");
        Self { backend, records }
    }

    /// [`ReadingStore::load`] wrapped for sharing.
    pub async fn load_shared(backend: Arc<dyn SlotBackend>) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(Self::load(backend).await))
    }

    #[must_use]
    pub fn records(&self) -> &[ReadingRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add `record` at the end and rewrite the slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IncompleteRecord`] for a record with an empty
    /// field, or the backend's write error. The store is unchanged on error.
    pub async fn append(&mut self, record: ReadingRecord) -> Result<(), StorageError> {
        if let Some(field) = record.missing_field() {
            return Err(StorageError::IncompleteRecord(field));
        }
        let mut staged = self.records.clone();
        staged.push(record);
        self.commit(staged).await?;
        info!(count = self.records.len(), "store: appended reading");
        Ok(())
    }

    /// Remove the record at `index` and rewrite the slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfRange`] or the backend's write
    /// error. The store is unchanged on error.
    pub async fn delete_at(&mut self, index: usize) -> Result<ReadingRecord, StorageError> {
        let len = self.records.len();
        if index >= len {
            return Err(StorageError::IndexOutOfRange { index, len });
        }
        let mut staged = self.records.clone();
        let removed = staged.remove(index);
        self.commit(staged).await?;
        info!(index, count = self.records.len(), "store: deleted reading");
        Ok(removed)
    }

    async fn commit(&mut self, staged: Vec<ReadingRecord>) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&staged)?;
        if let Err(e) = self.backend.write(READINGS_SLOT, &encoded).await {
            warn!(error = %e, "store: write failed");
            return Err(e);
        }
        self.records = staged;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
