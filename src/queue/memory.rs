//! In-memory queue backend
//!
//! Same semantics as the SQLite queue without durability. Delays are measured
//! on the tokio clock, so tests running with paused time can advance it.

use crate::queue::{partition_for, Consumer, Producer, QueueError, QueueResult, Record};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    topic: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    logs: HashMap<String, Vec<Record>>,
    scheduled: Vec<Scheduled>,
    /// (group, topic, partition) -> last committed offset
    committed: HashMap<(String, String, u32), i64>,
    next_offset: i64,
}

impl Inner {
    fn append(&mut self, topic: &str, payload: Vec<u8>, partitions: u32) {
        self.next_offset += 1;
        let record = Record {
            topic: topic.to_string(),
            partition: partition_for(&payload, partitions),
            offset: self.next_offset,
            payload,
        };
        self.logs.entry(topic.to_string()).or_default().push(record);
    }

    /// Moves every due delayed message onto its topic log, oldest first
    fn promote_due(&mut self, now: Instant, partitions: u32) {
        if self.scheduled.is_empty() {
            return;
        }

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| s.due <= now);
        self.scheduled = pending;

        due.sort_by_key(|s| s.due);
        for s in due {
            self.append(&s.topic, s.payload, partitions);
        }
    }

    fn committed(&self, group: &str, topic: &str, partition: u32) -> i64 {
        self.committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }
}

/// Queue held entirely in process memory
#[derive(Debug)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    partitions: u32,
}

impl MemoryQueue {
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            partitions: partitions.max(1),
        }
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| QueueError::Backend("in-memory queue lock poisoned".to_string()))
    }

    /// Every payload appended to a topic so far, in offset order
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        let Ok(mut inner) = self.lock() else {
            return Vec::new();
        };
        inner.promote_due(Instant::now(), self.partitions);
        inner
            .logs
            .get(topic)
            .map(|log| log.iter().map(Record::payload_text).collect())
            .unwrap_or_default()
    }

    /// Number of delayed messages not yet due
    pub fn scheduled_len(&self) -> usize {
        self.lock().map(|inner| inner.scheduled.len()).unwrap_or(0)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Producer for MemoryQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<()> {
        let mut inner = self.lock()?;
        inner.append(topic, payload.to_vec(), self.partitions);
        Ok(())
    }

    async fn publish_delayed(
        &self,
        topic: &str,
        payload: &[u8],
        delay: Duration,
    ) -> QueueResult<()> {
        let mut inner = self.lock()?;
        inner.scheduled.push(Scheduled {
            due: Instant::now() + delay,
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryQueue {
    async fn poll(&self, group: &str, topic: &str, max: usize) -> QueueResult<Vec<Record>> {
        let mut inner = self.lock()?;
        inner.promote_due(Instant::now(), self.partitions);

        let Some(log) = inner.logs.get(topic) else {
            return Ok(Vec::new());
        };

        Ok(log
            .iter()
            .filter(|record| record.offset > inner.committed(group, topic, record.partition))
            .take(max)
            .cloned()
            .collect())
    }

    async fn commit(&self, group: &str, record: &Record) -> QueueResult<()> {
        let mut inner = self.lock()?;
        let entry = inner
            .committed
            .entry((group.to_string(), record.topic.clone(), record.partition))
            .or_insert(0);
        *entry = (*entry).max(record.offset);
        Ok(())
    }

    async fn backlog(&self, group: &str, topic: &str) -> QueueResult<u64> {
        let inner = self.lock()?;
        Ok(inner
            .logs
            .get(topic)
            .map(|log| {
                log.iter()
                    .filter(|r| r.offset > inner.committed(group, topic, r.partition))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn topic_len(&self, topic: &str) -> QueueResult<u64> {
        let inner = self.lock()?;
        Ok(inner.logs.get(topic).map(|log| log.len() as u64).unwrap_or(0))
    }
}
