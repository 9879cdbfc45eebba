//! Per-subject entry collections and their two persistence backends.
//!
//! Every subject owns one ordered sequence of entries, created implicitly on
//! first append and mutated only by append and removal-by-id. The two
//! backends present the exact same observable contract so callers never know
//! which one a deployment selected:
//!
//! - [`SharedFileStore`]: one process-wide map mirrored to a single JSON
//!   file, rewritten wholesale on every mutation.
//! - [`ObjectEntryStore`]: one JSON object per subject in the object store,
//!   read-modify-written as a unit.
//!
//! Neither backend locks per subject: concurrent mutations of one subject's
//! collection are last-writer-wins over the whole collection.

use crate::object_store::{sanitize_path_component, ObjectStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One durable metadata record pointing at a stored media object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque unique identifier, generated at creation
    pub id: String,
    /// Durable locator for the stored media object
    pub media_url: String,
    /// User-supplied free text
    pub caption: String,
    /// Creation timestamp, UTC
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Create a new entry with a fresh identifier and the current time.
    /// All fields are immutable afterwards; there is no edit operation.
    pub fn new(media_url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            media_url: media_url.into(),
            caption: caption.into(),
            created_at: Utc::now(),
        }
    }
}

/// Errors that can occur during entry persistence
#[derive(Error, Debug)]
pub enum EntryStoreError {
    #[error("entry store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for EntryStoreError {
    fn from(err: StoreError) -> Self {
        EntryStoreError::Unavailable(err.to_string())
    }
}

/// Contract both persistence backends implement
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// The subject's entries in append order; empty for unknown subjects
    async fn list(&self, subject: &str) -> Result<Vec<Entry>, EntryStoreError>;

    /// Append an entry to the subject's collection
    async fn append(&self, subject: &str, entry: Entry) -> Result<(), EntryStoreError>;

    /// Remove an entry by id; `None` when the id is not the subject's
    async fn remove(&self, subject: &str, entry_id: &str)
        -> Result<Option<Entry>, EntryStoreError>;
}

/// Shared-file backend: a process-wide map mirrored to one local JSON file
pub struct SharedFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl SharedFileStore {
    /// Load the store from disk. A missing file starts empty; a corrupt
    /// file also starts empty, with a warning, rather than failing startup.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => {
                    info!(path = %path.display(), "loaded entries from disk");
                    map
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "entries file is corrupt; starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no saved entries; starting fresh");
                HashMap::new()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "could not read entries file; starting empty"
                );
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Rewrite the whole backing file from the in-memory map
    async fn flush(&self, entries: &HashMap<String, Vec<Entry>>) -> Result<(), EntryStoreError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|err| EntryStoreError::Unavailable(err.to_string()))?;

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| EntryStoreError::Unavailable(err.to_string()))?;

        debug!(path = %self.path.display(), "entries mirrored to disk");
        Ok(())
    }
}

#[async_trait]
impl EntryStore for SharedFileStore {
    async fn list(&self, subject: &str) -> Result<Vec<Entry>, EntryStoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(subject)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, subject: &str, entry: Entry) -> Result<(), EntryStoreError> {
        let mut entries = self.entries.write().await;
        entries.entry(subject.to_string()).or_default().push(entry);
        self.flush(&entries).await
    }

    async fn remove(
        &self,
        subject: &str,
        entry_id: &str,
    ) -> Result<Option<Entry>, EntryStoreError> {
        let mut entries = self.entries.write().await;

        let Some(list) = entries.get_mut(subject) else {
            return Ok(None);
        };
        let Some(position) = list.iter().position(|e| e.id == entry_id) else {
            return Ok(None);
        };

        let removed = list.remove(position);
        self.flush(&entries).await?;
        Ok(Some(removed))
    }
}

/// Object backend: one JSON object per subject at a subject-scoped key
pub struct ObjectEntryStore {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
}

impl ObjectEntryStore {
    pub fn new(store: Arc<dyn ObjectStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    fn subject_key(&self, subject: &str) -> String {
        format!(
            "{}/{}.json",
            self.key_prefix.trim_end_matches('/'),
            sanitize_path_component(subject)
        )
    }

    /// Read and deserialize the subject's collection. Missing objects are an
    /// empty collection; corrupt objects start empty with a warning, the
    /// same rule the file backend applies to its backing file.
    async fn read_entries(&self, subject: &str) -> Result<Vec<Entry>, EntryStoreError> {
        let key = self.subject_key(subject);

        match self.store.get(&key).await? {
            None => Ok(Vec::new()),
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => Ok(entries),
                Err(err) => {
                    warn!(
                        key = %key,
                        error = %err,
                        "entry object is corrupt; treating as empty"
                    );
                    Ok(Vec::new())
                }
            },
        }
    }

    async fn write_entries(
        &self,
        subject: &str,
        entries: &[Entry],
    ) -> Result<(), EntryStoreError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|err| EntryStoreError::Unavailable(err.to_string()))?;

        self.store
            .put(&self.subject_key(subject), bytes, "application/json")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for ObjectEntryStore {
    async fn list(&self, subject: &str) -> Result<Vec<Entry>, EntryStoreError> {
        self.read_entries(subject).await
    }

    async fn append(&self, subject: &str, entry: Entry) -> Result<(), EntryStoreError> {
        let mut entries = self.read_entries(subject).await?;
        entries.push(entry);
        self.write_entries(subject, &entries).await
    }

    async fn remove(
        &self,
        subject: &str,
        entry_id: &str,
    ) -> Result<Option<Entry>, EntryStoreError> {
        let mut entries = self.read_entries(subject).await?;

        let Some(position) = entries.iter().position(|e| e.id == entry_id) else {
            return Ok(None);
        };

        let removed = entries.remove(position);
        self.write_entries(subject, &entries).await?;
        Ok(Some(removed))
    }
}
