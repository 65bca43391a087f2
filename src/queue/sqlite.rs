//! SQLite queue backend
//!
//! Each topic is a log in `queue_messages`; the row id is the offset.
//! Delayed publishes wait in `queue_scheduled` and are appended to the log
//! by whichever poll first sees them due. Committed offsets are kept per
//! consumer group, topic and partition.

use crate::queue::{partition_for, Consumer, Producer, QueueError, QueueResult, Record};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQL schema for the queue database
pub const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    partition INTEGER NOT NULL,
    payload BLOB NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_messages_topic ON queue_messages(topic, partition, id);

CREATE TABLE IF NOT EXISTS queue_scheduled (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    payload BLOB NOT NULL,
    due_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_scheduled_due ON queue_scheduled(due_at_ms);

CREATE TABLE IF NOT EXISTS queue_offsets (
    consumer_group TEXT NOT NULL,
    topic TEXT NOT NULL,
    partition INTEGER NOT NULL,
    committed INTEGER NOT NULL,
    PRIMARY KEY (consumer_group, topic, partition)
);
"#;

/// Durable queue stored in a SQLite database
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    partitions: u32,
}

impl SqliteQueue {
    /// Opens (or creates) the queue database at `path`
    pub fn new(path: &Path, partitions: u32) -> QueueResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
            partitions: partitions.max(1),
        })
    }

    /// Creates an in-memory queue (for testing)
    pub fn new_in_memory(partitions: u32) -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            partitions: partitions.max(1),
        })
    }

    fn conn(&self) -> QueueResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Backend("connection lock poisoned".to_string()))
    }

    /// Number of delayed messages not yet appended to their topic
    pub fn scheduled_len(&self) -> QueueResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM queue_scheduled", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn append(conn: &Connection, topic: &str, payload: &[u8], partitions: u32) -> QueueResult<()> {
        conn.execute(
            "INSERT INTO queue_messages (topic, partition, payload, published_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                topic,
                partition_for(payload, partitions),
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Appends every due delayed message to its topic, oldest first
    fn promote_due(conn: &mut Connection, partitions: u32) -> QueueResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let due: Vec<(i64, String, Vec<u8>)> = {
            let mut stmt = tx.prepare(
                "SELECT id, topic, payload FROM queue_scheduled
                 WHERE due_at_ms <= ?1 ORDER BY due_at_ms, id",
            )?;
            let rows = stmt.query_map(params![now_ms], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for (id, topic, payload) in &due {
            Self::append(&tx, topic, payload, partitions)?;
            tx.execute("DELETE FROM queue_scheduled WHERE id = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(due.len())
    }
}

#[async_trait]
impl Producer for SqliteQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<()> {
        let conn = self.conn()?;
        Self::append(&conn, topic, payload, self.partitions)
    }

    async fn publish_delayed(
        &self,
        topic: &str,
        payload: &[u8],
        delay: Duration,
    ) -> QueueResult<()> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due_at_ms = Utc::now().timestamp_millis().saturating_add(delay_ms);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO queue_scheduled (topic, payload, due_at_ms) VALUES (?1, ?2, ?3)",
            params![topic, payload, due_at_ms],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Consumer for SqliteQueue {
    async fn poll(&self, group: &str, topic: &str, max: usize) -> QueueResult<Vec<Record>> {
        let mut conn = self.conn()?;

        let promoted = Self::promote_due(&mut conn, self.partitions)?;
        if promoted > 0 {
            tracing::debug!("Promoted {} delayed messages", promoted);
        }

        let mut stmt = conn.prepare(
            "SELECT m.id, m.partition, m.payload
             FROM queue_messages m
             LEFT JOIN queue_offsets o
               ON o.consumer_group = ?1 AND o.topic = m.topic AND o.partition = m.partition
             WHERE m.topic = ?2 AND m.id > COALESCE(o.committed, 0)
             ORDER BY m.id
             LIMIT ?3",
        )?;

        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![group, topic, limit], |row| {
                Ok(Record {
                    topic: topic.to_string(),
                    offset: row.get(0)?,
                    partition: row.get(1)?,
                    payload: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn commit(&self, group: &str, record: &Record) -> QueueResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO queue_offsets (consumer_group, topic, partition, committed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(consumer_group, topic, partition) DO UPDATE SET
                committed = MAX(committed, excluded.committed)",
            params![group, record.topic, record.partition, record.offset],
        )?;
        Ok(())
    }

    async fn backlog(&self, group: &str, topic: &str) -> QueueResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM queue_messages m
             LEFT JOIN queue_offsets o
               ON o.consumer_group = ?1 AND o.topic = m.topic AND o.partition = m.partition
             WHERE m.topic = ?2 AND m.id > COALESCE(o.committed, 0)",
            params![group, topic],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn topic_len(&self, topic: &str) -> QueueResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE topic = ?1",
            params![topic],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_poll_commit() {
        let queue = SqliteQueue::new_in_memory(4).unwrap();
        for i in 0..5 {
            queue
                .publish("fetch", format!("site{}.com/", i).as_bytes())
                .await
                .unwrap();
        }

        let batch = queue.poll("g", "fetch", 10).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert!(batch.windows(2).all(|w| w[0].offset < w[1].offset));

        for record in &batch {
            queue.commit("g", record).await.unwrap();
        }

        assert!(queue.poll("g", "fetch", 10).await.unwrap().is_empty());
        assert_eq!(queue.backlog("g", "fetch").await.unwrap(), 0);
        assert_eq!(queue.topic_len("fetch").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let queue = SqliteQueue::new_in_memory(1).unwrap();
        queue.publish("fetch", b"a").await.unwrap();
        queue.publish("process", b"b").await.unwrap();

        let batch = queue.poll("g", "process", 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload_text(), "b");
    }

    #[tokio::test]
    async fn test_commit_never_moves_backwards() {
        let queue = SqliteQueue::new_in_memory(1).unwrap();
        queue.publish("t", b"1").await.unwrap();
        queue.publish("t", b"2").await.unwrap();

        let batch = queue.poll("g", "t", 10).await.unwrap();
        queue.commit("g", &batch[1]).await.unwrap();
        queue.commit("g", &batch[0]).await.unwrap();

        assert!(queue.poll("g", "t", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delayed_publish_waits() {
        let queue = SqliteQueue::new_in_memory(1).unwrap();
        queue
            .publish_delayed("t", b"later", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(queue.poll("g", "t", 10).await.unwrap().is_empty());
        assert_eq!(queue.scheduled_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_due_delayed_publish_is_appended() {
        let queue = SqliteQueue::new_in_memory(1).unwrap();
        queue
            .publish_delayed("t", b"now", Duration::ZERO)
            .await
            .unwrap();

        let batch = queue.poll("g", "t", 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload_text(), "now");
        assert_eq!(queue.scheduled_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offsets_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let queue = SqliteQueue::new(&path, 2).unwrap();
            queue.publish("t", b"one").await.unwrap();
            queue.publish("t", b"two").await.unwrap();
            let batch = queue.poll("g", "t", 1).await.unwrap();
            queue.commit("g", &batch[0]).await.unwrap();
        }

        let queue = SqliteQueue::new(&path, 2).unwrap();
        let batch = queue.poll("g", "t", 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload_text(), "two");
    }
}
