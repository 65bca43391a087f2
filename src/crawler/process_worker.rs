//! Processing stage
//!
//! For every key on the process topic: load the stored page, stream it
//! through the extractor, publish each discovered link to the fetch topic as
//! soon as it is found, then write the extracted text onto the page's record.

use crate::crawler::extractor::{extract, Extraction};
use crate::crawler::worker::RecordHandler;
use crate::queue::{CrawlMessage, Producer, Record};
use crate::storage::ContentStore;
use crate::url::SiteLink;
use crate::CrawlError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumer group of the processing stage
pub const PROCESS_CONSUMER_GROUP: &str = "site-processing-service";

/// Which discovered links are admitted to the fetch topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Publish every link; repeats are absorbed by the fetch stage's
    /// upsert-if-changed check
    #[default]
    StoreDedup,
    /// Publish each distinct link at most once per page
    PerPageDedup,
}

impl AdmissionPolicy {
    pub fn from_flag(dedup_links_per_page: bool) -> Self {
        if dedup_links_per_page {
            Self::PerPageDedup
        } else {
            Self::StoreDedup
        }
    }
}

/// What handling one process-topic message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Page scanned, links published and text recorded
    Processed {
        key: String,
        links_published: usize,
        truncated: bool,
    },
    /// No stored body for the key; skipped
    MissingBlob { key: String },
    /// Message could not be understood; dropped
    Dropped { reason: String },
}

/// The processing worker
pub struct ProcessWorker {
    store: ContentStore,
    producer: Arc<dyn Producer>,
    fetch_topic: String,
    link_buffer: usize,
    admission: AdmissionPolicy,
}

impl ProcessWorker {
    pub fn new(
        store: ContentStore,
        producer: Arc<dyn Producer>,
        fetch_topic: impl Into<String>,
        link_buffer: usize,
        admission: AdmissionPolicy,
    ) -> Self {
        Self {
            store,
            producer,
            fetch_topic: fetch_topic.into(),
            link_buffer: link_buffer.max(1),
            admission,
        }
    }

    /// Handles one process-topic payload
    ///
    /// Returns `Err` for store and queue failures and when the page has no
    /// metadata record to update; all of these stop the worker.
    pub async fn handle_message(&self, payload: &[u8]) -> crate::Result<ProcessOutcome> {
        let raw = String::from_utf8_lossy(payload);
        let site = match SiteLink::parse(raw.trim()) {
            Ok(site) => site,
            Err(e) => {
                tracing::warn!("Dropping process message {:?}: {}", raw, e);
                return Ok(ProcessOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };
        let key = site.key();

        let body = match self.store.load_page(&key).await? {
            Some(body) => body,
            None => {
                tracing::warn!("No stored page for {}, skipping", key);
                return Ok(ProcessOutcome::MissingBlob { key });
            }
        };

        let (extraction, links_published) = self.scan(site, body).await?;

        let matched = self
            .store
            .record_extracted_text(&key, &extraction.text, Utc::now())
            .await?;
        if !matched {
            return Err(CrawlError::RecordMissing(key));
        }

        tracing::info!(
            "Processed {}: {} links found, {} published, {} chars of text{}",
            key,
            extraction.links_found,
            links_published,
            extraction.text.len(),
            if extraction.truncated { " (truncated)" } else { "" }
        );

        Ok(ProcessOutcome::Processed {
            key,
            links_published,
            truncated: extraction.truncated,
        })
    }

    /// Runs the extractor on a blocking thread and publishes links as they
    /// arrive
    async fn scan(&self, site: SiteLink, body: Vec<u8>) -> crate::Result<(Extraction, usize)> {
        let (tx, mut rx) = mpsc::channel::<String>(self.link_buffer);

        let task = tokio::task::spawn_blocking(move || {
            extract(Cursor::new(body), &site, |link| tx.blocking_send(link).is_ok())
        });

        let mut seen = HashSet::new();
        let mut published = 0;
        while let Some(link) = rx.recv().await {
            if self.admission == AdmissionPolicy::PerPageDedup && !seen.insert(link.clone()) {
                continue;
            }

            tracing::debug!("Discovered {}", link);
            let payload = CrawlMessage::new(link).encode()?;
            if let Err(e) = self.producer.publish(&self.fetch_topic, &payload).await {
                drop(rx);
                if let Err(join_error) = task.await {
                    tracing::error!("Extractor task failed after publish error: {}", join_error);
                }
                return Err(e.into());
            }
            published += 1;
        }

        let extraction = task.await?;
        Ok((extraction, published))
    }
}

#[async_trait]
impl RecordHandler for ProcessWorker {
    async fn handle_record(&self, record: &Record) -> crate::Result<()> {
        self.handle_message(&record.payload).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, QueueError, QueueResult};
    use crate::storage::{
        BlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore, SiteRecord,
    };
    use std::time::Duration;

    struct Harness {
        worker: ProcessWorker,
        queue: Arc<MemoryQueue>,
        metadata: Arc<MemoryMetadataStore>,
        blobs: Arc<MemoryBlobStore>,
    }

    fn harness(admission: AdmissionPolicy) -> Harness {
        let queue = Arc::new(MemoryQueue::new(1));
        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = ContentStore::new(metadata.clone(), blobs.clone());
        let worker = ProcessWorker::new(store, queue.clone(), "fetch", 2, admission);
        Harness {
            worker,
            queue,
            metadata,
            blobs,
        }
    }

    async fn seed_page(h: &Harness, key: &str, html: &str) {
        h.metadata
            .insert_record(&SiteRecord::new(key, "h", Utc::now()))
            .await
            .unwrap();
        h.blobs.put_blob(key, html.as_bytes()).await.unwrap();
    }

    fn published_links(queue: &MemoryQueue) -> Vec<String> {
        queue
            .payloads("fetch")
            .iter()
            .map(|p| CrawlMessage::decode(p.as_bytes()).unwrap().link)
            .collect()
    }

    #[tokio::test]
    async fn test_links_published_and_text_recorded() {
        let h = harness(AdmissionPolicy::StoreDedup);
        seed_page(
            &h,
            "example.com/",
            r#"<p>Hello<br>World</p><a href="/foo">f</a><a href="./bar">b</a><a href="http://other.com/x">o</a><script>ignored()</script>"#,
        )
        .await;

        let outcome = h.worker.handle_message(b"example.com/").await.unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Processed {
                key: "example.com/".to_string(),
                links_published: 3,
                truncated: false,
            }
        );
        assert_eq!(
            published_links(&h.queue),
            vec!["example.com/foo", "example.com/bar", "http://other.com/x"]
        );

        for payload in h.queue.payloads("fetch") {
            let message = CrawlMessage::decode(payload.as_bytes()).unwrap();
            assert_eq!(message.retry_count, 0);
        }

        let record = h.metadata.get_record("example.com/").await.unwrap().unwrap();
        let content = record.content.unwrap();
        assert!(content.contains("Hello"));
        assert!(content.contains("World"));
        assert!(!content.contains("ignored()"));
        assert!(record.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_store_dedup_publishes_repeats() {
        let h = harness(AdmissionPolicy::StoreDedup);
        seed_page(
            &h,
            "example.com/",
            r#"<a href="/a">1</a><a href="/a">2</a><a href="/a">3</a>"#,
        )
        .await;

        h.worker.handle_message(b"example.com/").await.unwrap();
        assert_eq!(published_links(&h.queue).len(), 3);
    }

    #[tokio::test]
    async fn test_per_page_dedup_publishes_once() {
        let h = harness(AdmissionPolicy::PerPageDedup);
        seed_page(
            &h,
            "example.com/",
            r#"<a href="/a">1</a><a href="/b">2</a><a href="/a">3</a>"#,
        )
        .await;

        h.worker.handle_message(b"example.com/").await.unwrap();
        assert_eq!(
            published_links(&h.queue),
            vec!["example.com/a", "example.com/b"]
        );
    }

    #[tokio::test]
    async fn test_more_links_than_buffer() {
        let h = harness(AdmissionPolicy::StoreDedup);
        let html: String = (0..50)
            .map(|i| format!(r#"<a href="/p{}">x</a>"#, i))
            .collect();
        seed_page(&h, "example.com/", &html).await;

        let outcome = h.worker.handle_message(b"example.com/").await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Processed {
                links_published: 50,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_blob_is_skipped() {
        let h = harness(AdmissionPolicy::StoreDedup);
        let outcome = h.worker.handle_message(b"example.com/nothing").await.unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::MissingBlob {
                key: "example.com/nothing".to_string()
            }
        );
        assert!(h.queue.payloads("fetch").is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_fatal() {
        let h = harness(AdmissionPolicy::StoreDedup);
        h.blobs
            .put_blob("example.com/orphan", b"<p>orphan</p>")
            .await
            .unwrap();

        let result = h.worker.handle_message(b"example.com/orphan").await;
        assert!(matches!(result, Err(CrawlError::RecordMissing(_))));
    }

    #[tokio::test]
    async fn test_unparseable_key_is_dropped() {
        let h = harness(AdmissionPolicy::StoreDedup);
        let outcome = h.worker.handle_message(b"   ").await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Dropped { .. }));
    }

    struct FailingProducer;

    #[async_trait]
    impl Producer for FailingProducer {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> QueueResult<()> {
            Err(QueueError::Backend("broker down".to_string()))
        }

        async fn publish_delayed(
            &self,
            _topic: &str,
            _payload: &[u8],
            _delay: Duration,
        ) -> QueueResult<()> {
            Err(QueueError::Backend("broker down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal_and_leaves_record_untouched() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = ContentStore::new(metadata.clone(), blobs.clone());
        let worker = ProcessWorker::new(
            store,
            Arc::new(FailingProducer),
            "fetch",
            1,
            AdmissionPolicy::StoreDedup,
        );

        metadata
            .insert_record(&SiteRecord::new("example.com/", "h", Utc::now()))
            .await
            .unwrap();
        blobs
            .put_blob("example.com/", br#"<a href="/a">a</a><a href="/b">b</a>"#)
            .await
            .unwrap();

        let result = worker.handle_message(b"example.com/").await;
        assert!(matches!(result, Err(CrawlError::Queue(_))));

        let record = metadata.get_record("example.com/").await.unwrap().unwrap();
        assert!(record.content.is_none());
    }
}
