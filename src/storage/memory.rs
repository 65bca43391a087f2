//! In-memory storage backends
//!
//! Used by tests and local dry runs. Both stores count their writes so the
//! dedup guarantees of the pipeline can be observed directly.

use crate::storage::traits::{BlobStore, MetadataStore, StorageError, StorageResult};
use crate::storage::{RecordUpdate, SiteRecord, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Database("in-memory store lock poisoned".to_string()))
}

/// Metadata store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, SiteRecord>>,
    writes: AtomicUsize,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inserts and updates applied so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record
    pub fn records(&self) -> Vec<SiteRecord> {
        lock(&self.records)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_record(&self, key: &str) -> StorageResult<Option<SiteRecord>> {
        Ok(lock(&self.records)?.get(key).cloned())
    }

    async fn insert_record(&self, record: &SiteRecord) -> StorageResult<()> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&record.key) {
            return Err(StorageError::Conflict(record.key.clone()));
        }
        records.insert(record.key.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_record(&self, key: &str, update: &RecordUpdate) -> StorageResult<bool> {
        let mut records = lock(&self.records)?;
        match records.get_mut(key) {
            Some(record) => {
                update.apply_to(record);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_records(&self) -> StorageResult<u64> {
        Ok(lock(&self.records)?.len() as u64)
    }

    async fn upsert_if_changed(
        &self,
        key: &str,
        hash: &str,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<UpsertOutcome> {
        let mut records = lock(&self.records)?;
        let outcome = match records.get(key).map(|record| record.content_hash == hash) {
            None => {
                records.insert(key.to_string(), SiteRecord::new(key, hash, fetched_at));
                UpsertOutcome::Inserted
            }
            Some(false) => {
                if let Some(record) = records.get_mut(key) {
                    RecordUpdate::content_hash(hash, fetched_at).apply_to(record);
                }
                UpsertOutcome::Updated
            }
            Some(true) => return Ok(UpsertOutcome::Unchanged),
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }
}

/// Blob store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of puts applied so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(&self, key: &str, body: &[u8]) -> StorageResult<()> {
        lock(&self.blobs)?.insert(key.to_string(), body.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(lock(&self.blobs)?.get(key).cloned())
    }
}
