//! Consume loop shared by the fetch and processing workers
//!
//! The loop polls a batch, hands each record to the worker in order and
//! commits it once handled. A handler error stops the loop before the
//! record's offset is committed, so the record is redelivered to whichever
//! worker instance consumes the group next.

use crate::queue::{Consumer, Record};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-record work done by a worker
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Handles one record
    ///
    /// `Ok` means the record may be committed, whether or not it produced
    /// any effect. `Err` is fatal for the worker.
    async fn handle_record(&self, record: &Record) -> crate::Result<()>;
}

/// Polls one topic for one consumer group
#[derive(Clone)]
pub struct ConsumeLoop {
    consumer: Arc<dyn Consumer>,
    group: String,
    topic: String,
    batch_size: usize,
    poll_interval: Duration,
}

impl ConsumeLoop {
    pub fn new(
        consumer: Arc<dyn Consumer>,
        group: impl Into<String>,
        topic: impl Into<String>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            group: group.into(),
            topic: topic.into(),
            batch_size: batch_size.max(1),
            poll_interval,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Polls and handles a single batch; returns how many records it held
    pub async fn poll_once<H>(&self, handler: &H) -> crate::Result<usize>
    where
        H: RecordHandler + ?Sized,
    {
        let batch = self
            .consumer
            .poll(&self.group, &self.topic, self.batch_size)
            .await?;

        for record in &batch {
            if let Err(e) = handler.handle_record(record).await {
                tracing::error!(
                    "Fatal error on {}[{}]@{}: {}",
                    record.topic,
                    record.partition,
                    record.offset,
                    e
                );
                return Err(e);
            }
            self.consumer.commit(&self.group, record).await?;
        }

        Ok(batch.len())
    }

    /// Polls until the topic is drained; returns the number of records handled
    pub async fn drain<H>(&self, handler: &H) -> crate::Result<usize>
    where
        H: RecordHandler + ?Sized,
    {
        let mut total = 0;
        loop {
            let handled = self.poll_once(handler).await?;
            if handled == 0 {
                return Ok(total);
            }
            total += handled;
        }
    }

    /// Runs until `shutdown` resolves or a handler fails
    ///
    /// Shutdown is observed between batches; a batch in progress is finished
    /// first.
    pub async fn run<H, S>(&self, handler: &H, shutdown: S) -> crate::Result<()>
    where
        H: RecordHandler + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            "Consuming {} as group {} (batch size {})",
            self.topic,
            self.group,
            self.batch_size
        );

        let mut handled_total: u64 = 0;
        loop {
            // Only checked here and while idle, never mid-batch
            let stop = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = std::future::ready(()) => false,
            };
            if stop {
                break;
            }

            let handled = self.poll_once(handler).await?;
            handled_total += handled as u64;
            if handled > 0 {
                continue;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!(
            "Stopped consuming {} after {} messages",
            self.topic,
            handled_total
        );
        Ok(())
    }
}
