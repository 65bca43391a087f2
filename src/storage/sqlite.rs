//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the MetadataStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{MetadataStore, StorageError, StorageResult};
use crate::storage::{RecordUpdate, SiteRecord, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Raw column values of a `sites` row before timestamp parsing
type SiteRow = (String, String, String, Option<String>, u32, Option<String>);

/// SQLite metadata store
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Opens (or creates) the metadata database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn record_from_row(row: SiteRow) -> StorageResult<SiteRecord> {
    let (key, content_hash, last_fetched, last_updated, back_link_count, content) = row;
    Ok(SiteRecord {
        key,
        content_hash,
        last_fetched: parse_timestamp(&last_fetched)?,
        last_updated: last_updated.as_deref().map(parse_timestamp).transpose()?,
        back_link_count,
        content,
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_record(&self, key: &str) -> StorageResult<Option<SiteRecord>> {
        let row: Option<SiteRow> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT key, content_hash, last_fetched, last_updated, back_link_count, content
                 FROM sites WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?
        };

        row.map(record_from_row).transpose()
    }

    async fn insert_record(&self, record: &SiteRecord) -> StorageResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO sites (key, content_hash, last_fetched, last_updated, back_link_count, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.key,
                record.content_hash,
                record.last_fetched.to_rfc3339(),
                record.last_updated.map(|at| at.to_rfc3339()),
                record.back_link_count,
                record.content,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::Conflict(record.key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_record(&self, key: &str, update: &RecordUpdate) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sites SET
                content_hash = COALESCE(?2, content_hash),
                last_fetched = COALESCE(?3, last_fetched),
                content = COALESCE(?4, content),
                last_updated = COALESCE(?5, last_updated)
             WHERE key = ?1",
            params![
                key,
                update.content_hash,
                update.last_fetched.map(|at| at.to_rfc3339()),
                update.content,
                update.last_updated.map(|at| at.to_rfc3339()),
            ],
        )?;
        Ok(changed > 0)
    }

    async fn count_records(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sites", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Keyed `INSERT ... ON CONFLICT DO UPDATE ... WHERE` inside an immediate
    /// transaction: the unique index on `key` serializes writers, and the
    /// prior hash read in the same transaction tells insert from update.
    async fn upsert_if_changed(
        &self,
        key: &str,
        hash: &str,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<UpsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT content_hash FROM sites WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let changed = tx.execute(
            "INSERT INTO sites (key, content_hash, last_fetched, back_link_count)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(key) DO UPDATE SET
                content_hash = excluded.content_hash,
                last_fetched = excluded.last_fetched
             WHERE sites.content_hash <> excluded.content_hash",
            params![key, hash, fetched_at.to_rfc3339()],
        )?;

        tx.commit()?;

        Ok(match (previous, changed) {
            (_, 0) => UpsertOutcome::Unchanged,
            (None, _) => UpsertOutcome::Inserted,
            (Some(_), _) => UpsertOutcome::Updated,
        })
    }
}
