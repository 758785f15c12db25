//! Persistence of validated intake records and conversation references.
//!
//! [`FileRecordStore`] writes one JSON document per item into a sharded directory tree:
//!
//! ```text
//! <data_dir>/patients/<s1>/<s2>/<id>/record.json
//! <data_dir>/conversations/<s1>/<s2>/<id>/conversation.json
//! ```
//!
//! `s1`/`s2` are the first two byte pairs of the identifier, which keeps directory fan-out
//! small as the number of records grows. [`MemoryRecordStore`] keeps everything in memory.

use crate::constants::{
    CONVERSATIONS_DIR_NAME, CONVERSATION_JSON_FILENAME, PATIENTS_DIR_NAME, RECORD_JSON_FILENAME,
};
use crate::error::StoreError;
use crate::locale::Locale;
use crate::schema::PatientHistory;
use chrono::{DateTime, Utc};
use intake_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// A validated record as written to storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub locale: Locale,
    pub stored_at: DateTime<Utc>,
    pub record: PatientHistory,
}

/// One exchanged message and the reply it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationReference {
    pub id: RecordId,
    pub sender: String,
    pub message: String,
    pub response: String,
    pub stored_at: DateTime<Utc>,
}

/// Persistence collaborator of the intake service.
pub trait RecordStore: Send + Sync {
    /// Persists a validated record and returns its identifier.
    fn store_record(&self, record: &PatientHistory, locale: Locale) -> Result<RecordId, StoreError>;

    /// Persists one message/reply pair and returns its identifier.
    fn store_conversation_reference(
        &self,
        sender: &str,
        message: &str,
        response: &str,
    ) -> Result<RecordId, StoreError>;
}

#[derive(Clone, Debug)]
pub struct FileRecordStore {
    data_dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn patients_dir(&self) -> PathBuf {
        self.data_dir.join(PATIENTS_DIR_NAME)
    }

    fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join(CONVERSATIONS_DIR_NAME)
    }

    /// Reads back a stored record.
    pub fn load_record(&self, id: RecordId) -> Result<StoredRecord, StoreError> {
        let path = id.sharded_dir(&self.patients_dir()).join(RECORD_JSON_FILENAME);
        let contents = fs::read_to_string(path).map_err(StoreError::FileRead)?;
        serde_json::from_str(&contents).map_err(StoreError::Deserialization)
    }

    /// Reads back a stored conversation reference.
    pub fn load_conversation_reference(
        &self,
        id: RecordId,
    ) -> Result<ConversationReference, StoreError> {
        let path = id
            .sharded_dir(&self.conversations_dir())
            .join(CONVERSATION_JSON_FILENAME);
        let contents = fs::read_to_string(path).map_err(StoreError::FileRead)?;
        serde_json::from_str(&contents).map_err(StoreError::Deserialization)
    }
}

impl RecordStore for FileRecordStore {
    fn store_record(&self, record: &PatientHistory, locale: Locale) -> Result<RecordId, StoreError> {
        let (id, dir) = create_unique_sharded_dir(&self.patients_dir(), RecordId::new)?;
        let stored = StoredRecord {
            id,
            locale,
            stored_at: Utc::now(),
            record: record.clone(),
        };
        write_json(&dir.join(RECORD_JSON_FILENAME), &stored)?;
        tracing::info!(record_id = %id, "stored intake record");
        Ok(id)
    }

    fn store_conversation_reference(
        &self,
        sender: &str,
        message: &str,
        response: &str,
    ) -> Result<RecordId, StoreError> {
        let (id, dir) = create_unique_sharded_dir(&self.conversations_dir(), RecordId::new)?;
        let reference = ConversationReference {
            id,
            sender: sender.to_owned(),
            message: message.to_owned(),
            response: response.to_owned(),
            stored_at: Utc::now(),
        };
        write_json(&dir.join(CONVERSATION_JSON_FILENAME), &reference)?;
        tracing::debug!(reference_id = %id, "stored conversation reference");
        Ok(id)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(StoreError::Serialization)?;
    fs::write(path, json).map_err(StoreError::FileWrite)
}

/// Creates a fresh `<base>/<s1>/<s2>/<id>` directory, drawing identifiers from `id_source`.
///
/// An identifier whose directory already exists is skipped; allocation gives up after
/// [`MAX_ALLOCATION_ATTEMPTS`] collisions.
fn create_unique_sharded_dir(
    base_dir: &Path,
    mut id_source: impl FnMut() -> RecordId,
) -> Result<(RecordId, PathBuf), StoreError> {
    for _attempt in 0..MAX_ALLOCATION_ATTEMPTS {
        let id = id_source();
        let candidate = id.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(StoreError::DirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((id, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StoreError::DirCreation(e)),
        }
    }

    Err(StoreError::Allocation(MAX_ALLOCATION_ATTEMPTS))
}

/// In-memory store for tests and sessions that should leave nothing on disk.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
    conversations: Mutex<Vec<ConversationReference>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn conversations(&self) -> Vec<ConversationReference> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordStore for MemoryRecordStore {
    fn store_record(&self, record: &PatientHistory, locale: Locale) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredRecord {
                id,
                locale,
                stored_at: Utc::now(),
                record: record.clone(),
            });
        Ok(id)
    }

    fn store_conversation_reference(
        &self,
        sender: &str,
        message: &str,
        response: &str,
    ) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConversationReference {
                id,
                sender: sender.to_owned(),
                message: message.to_owned(),
                response: response.to_owned(),
                stored_at: Utc::now(),
            });
        Ok(id)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn store_record(&self, record: &PatientHistory, locale: Locale) -> Result<RecordId, StoreError> {
        (**self).store_record(record, locale)
    }

    fn store_conversation_reference(
        &self,
        sender: &str,
        message: &str,
        response: &str,
    ) -> Result<RecordId, StoreError> {
        (**self).store_conversation_reference(sender, message, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record() -> PatientHistory {
        PatientHistory::new(
            "Jane Doe",
            NaiveDate::parse_from_str("1990-01-01", "%Y-%m-%d").unwrap(),
        )
    }

    #[test]
    fn records_are_written_to_sharded_directories() {
        let temp = TempDir::new().unwrap();
        let store = FileRecordStore::new(temp.path());

        let id = store.store_record(&record(), Locale::Es).unwrap();

        let canonical = id.to_string();
        let expected = temp
            .path()
            .join(PATIENTS_DIR_NAME)
            .join(&canonical[0..2])
            .join(&canonical[2..4])
            .join(&canonical)
            .join(RECORD_JSON_FILENAME);
        assert!(expected.is_file());

        let stored = store.load_record(id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.locale, Locale::Es);
        assert_eq!(stored.record, record());
    }

    #[test]
    fn conversation_references_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileRecordStore::new(temp.path());

        let id = store
            .store_conversation_reference("+15550100", "hello", "What is your name?")
            .unwrap();

        let reference = store.load_conversation_reference(id).unwrap();
        assert_eq!(reference.sender, "+15550100");
        assert_eq!(reference.message, "hello");
        assert_eq!(reference.response, "What is your name?");
        assert!(id
            .sharded_dir(&temp.path().join(CONVERSATIONS_DIR_NAME))
            .join(CONVERSATION_JSON_FILENAME)
            .is_file());
    }

    #[test]
    fn allocation_skips_existing_directories() {
        let temp = TempDir::new().unwrap();
        let taken = RecordId::new();
        fs::create_dir_all(taken.sharded_dir(temp.path())).unwrap();
        let fresh = RecordId::new();

        let mut ids = vec![fresh, taken].into_iter();
        let (id, dir) =
            create_unique_sharded_dir(temp.path(), || ids.next_back().unwrap()).unwrap();
        assert_eq!(id, fresh);
        assert!(dir.is_dir());
    }

    #[test]
    fn allocation_gives_up_after_repeated_collisions() {
        let temp = TempDir::new().unwrap();
        let taken = RecordId::new();
        fs::create_dir_all(taken.sharded_dir(temp.path())).unwrap();

        let err = create_unique_sharded_dir(temp.path(), || taken).unwrap_err();
        assert!(matches!(err, StoreError::Allocation(MAX_ALLOCATION_ATTEMPTS)));
    }

    #[test]
    fn memory_store_keeps_everything() {
        let store = MemoryRecordStore::new();
        let id = store.store_record(&record(), Locale::En).unwrap();
        store
            .store_conversation_reference("cli_user", "hi", "hello")
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(store.conversations()[0].response, "hello");
    }
}
