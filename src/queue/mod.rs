//! Message queue contract for the crawl pipeline
//!
//! Topics are append-only logs split into a fixed number of partitions.
//! Consumers in a group read every partition of a topic in offset order and
//! commit what they have handled; uncommitted messages are redelivered.
//! Delayed publishes are held by the queue and appended to the log once due,
//! so nothing in the workers sleeps on a retry.

mod memory;
mod message;
mod sqlite;

pub use memory::MemoryQueue;
pub use message::CrawlMessage;
pub use sqlite::SqliteQueue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    /// Position in the topic log; increases within every partition
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl Record {
    /// The payload as UTF-8 text, lossily decoded
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Publishing side of the queue
#[async_trait]
pub trait Producer: Send + Sync {
    /// Appends a message to a topic
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<()>;

    /// Appends a message to a topic once `delay` has elapsed
    async fn publish_delayed(&self, topic: &str, payload: &[u8], delay: Duration)
        -> QueueResult<()>;
}

/// Consuming side of the queue
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Returns up to `max` messages past the group's committed offsets
    async fn poll(&self, group: &str, topic: &str, max: usize) -> QueueResult<Vec<Record>>;

    /// Marks a record (and everything before it in its partition) as handled
    async fn commit(&self, group: &str, record: &Record) -> QueueResult<()>;

    /// Number of messages in a topic the group has not committed yet
    async fn backlog(&self, group: &str, topic: &str) -> QueueResult<u64>;

    /// Number of messages ever appended to a topic
    async fn topic_len(&self, topic: &str) -> QueueResult<u64>;
}

/// Picks the partition for a payload
///
/// FNV-1a over the payload bytes: stable across processes and releases, so
/// the same payload always lands in the same partition.
pub fn partition_for(payload: &[u8], partitions: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    if partitions <= 1 {
        return 0;
    }

    let hash = payload.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    });
    (hash % u64::from(partitions)) as u32
}
