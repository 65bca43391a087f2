//! Storage traits and error types
//!
//! This module defines the contracts the crawl pipeline consumes from the
//! metadata (document) store and the blob store.

use crate::storage::{RecordUpdate, SiteRecord, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata store holding one [`SiteRecord`] per canonical key
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Looks up the record for a key; `Ok(None)` means not found
    async fn get_record(&self, key: &str) -> StorageResult<Option<SiteRecord>>;

    /// Inserts a new record
    ///
    /// Fails with [`StorageError::Conflict`] when the key already exists.
    async fn insert_record(&self, record: &SiteRecord) -> StorageResult<()>;

    /// Applies the set fields of `update` to an existing record
    ///
    /// Returns `false` when no record matched the key.
    async fn update_record(&self, key: &str, update: &RecordUpdate) -> StorageResult<bool>;

    /// Counts stored records
    async fn count_records(&self) -> StorageResult<u64>;

    /// Inserts or updates the record for `key` only when `hash` differs from
    /// the stored content hash
    ///
    /// The default runs the protocol as lookup, then insert or update.
    /// Backends with an atomic keyed upsert should override it so concurrent
    /// writers on one key cannot interleave between the lookup and the write.
    async fn upsert_if_changed(
        &self,
        key: &str,
        hash: &str,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<UpsertOutcome> {
        match self.get_record(key).await? {
            None => {
                self.insert_record(&SiteRecord::new(key, hash, fetched_at))
                    .await?;
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) if existing.content_hash != hash => {
                let matched = self
                    .update_record(key, &RecordUpdate::content_hash(hash, fetched_at))
                    .await?;
                if !matched {
                    return Err(StorageError::Database(format!(
                        "record {} disappeared during upsert",
                        key
                    )));
                }
                Ok(UpsertOutcome::Updated)
            }
            Some(_) => Ok(UpsertOutcome::Unchanged),
        }
    }
}

/// Flat blob namespace keyed by canonical key
///
/// Only the latest body per key is kept.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores (or overwrites) the body for a key
    async fn put_blob(&self, key: &str, body: &[u8]) -> StorageResult<()>;

    /// Loads the body for a key; `Ok(None)` when nothing is stored
    async fn get_blob(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
}
