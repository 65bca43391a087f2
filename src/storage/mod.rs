//! Storage module for persisting crawl data
//!
//! This module handles the two stores the pipeline writes to:
//! - the metadata store, one [`SiteRecord`] per canonical key
//! - the blob store, the latest raw body fetched for each key
//!
//! [`ContentStore`] composes both and owns the upsert-if-changed protocol.

mod blob;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use blob::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryMetadataStore};
pub use sqlite::SqliteMetadataStore;
pub use traits::{BlobStore, MetadataStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Metadata for one crawl target
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    /// Canonical key (host + path), unique
    pub key: String,
    /// Fingerprint of the most recently stored blob
    pub content_hash: String,
    /// When the stored blob was fetched
    pub last_fetched: DateTime<Utc>,
    /// When text extraction last completed
    pub last_updated: Option<DateTime<Utc>>,
    pub back_link_count: u32,
    /// Visible text extracted by the processing stage
    pub content: Option<String>,
}

impl SiteRecord {
    /// A fresh record as written on the first successful fetch of a key
    pub fn new(key: &str, content_hash: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            content_hash: content_hash.to_string(),
            last_fetched: fetched_at,
            last_updated: None,
            back_link_count: 0,
            content: None,
        }
    }
}

/// Fields to change on an existing record; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub content_hash: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    /// Update written by the fetch stage when the content changed
    pub fn content_hash(hash: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            content_hash: Some(hash.to_string()),
            last_fetched: Some(fetched_at),
            ..Self::default()
        }
    }

    /// Update written by the processing stage after extraction
    pub fn extracted_text(text: &str, updated_at: DateTime<Utc>) -> Self {
        Self {
            content: Some(text.to_string()),
            last_updated: Some(updated_at),
            ..Self::default()
        }
    }

    /// Applies the set fields to a record
    pub fn apply_to(&self, record: &mut SiteRecord) {
        if let Some(hash) = &self.content_hash {
            record.content_hash = hash.clone();
        }
        if let Some(at) = self.last_fetched {
            record.last_fetched = at;
        }
        if let Some(content) = &self.content {
            record.content = Some(content.clone());
        }
        if let Some(at) = self.last_updated {
            record.last_updated = Some(at);
        }
    }
}

/// What an upsert-if-changed did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created
    Inserted,
    /// The stored hash differed and was replaced
    Updated,
    /// The stored hash matched; nothing was written
    Unchanged,
}

impl UpsertOutcome {
    /// True when the stored content changed and needs (re)processing
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// The content store the pipeline talks to: metadata plus blobs
#[derive(Clone)]
pub struct ContentStore {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
}

impl ContentStore {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Persists a fetched body unless identical content is already stored
    ///
    /// # Protocol
    ///
    /// 1. Look up the record by key; any error other than not-found aborts.
    /// 2. Same hash as stored: no write to either store.
    /// 3. Otherwise write the blob, then upsert the record atomically.
    ///
    /// The blob goes first so that a failure between the two writes leaves
    /// the record on its previous hash and the next fetch rewrites both.
    pub async fn store_if_changed(
        &self,
        key: &str,
        body: &[u8],
        hash: &str,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<UpsertOutcome> {
        if let Some(existing) = self.metadata.get_record(key).await? {
            if existing.content_hash == hash {
                return Ok(UpsertOutcome::Unchanged);
            }
        }

        self.blobs.put_blob(key, body).await?;
        self.metadata.upsert_if_changed(key, hash, fetched_at).await
    }

    /// Loads the stored body for a key
    pub async fn load_page(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.blobs.get_blob(key).await
    }

    /// Writes extracted text onto the record; `false` if the record is missing
    pub async fn record_extracted_text(
        &self,
        key: &str,
        text: &str,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        self.metadata
            .update_record(key, &RecordUpdate::extracted_text(text, updated_at))
            .await
    }
}
