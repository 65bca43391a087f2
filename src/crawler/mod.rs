//! Crawler module for the two pipeline stages
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and content fingerprinting
//! - Streaming HTML link and text extraction
//! - Bounded retries with dead-lettering
//! - The fetch and processing workers and their consume loop

mod extractor;
mod fetch_worker;
mod fetcher;
mod hasher;
mod process_worker;
mod retry;
mod worker;

pub use extractor::{decode_entities, extract, extract_links, Extraction};
pub use fetch_worker::{FetchOutcome, FetchWorker, FETCH_CONSUMER_GROUP};
pub use fetcher::{build_http_client, fetch_url, is_transient_status, FetchResult};
pub use hasher::{content_hash, CONTENT_HASH_LEN};
pub use process_worker::{AdmissionPolicy, ProcessOutcome, ProcessWorker, PROCESS_CONSUMER_GROUP};
pub use retry::{RetryCoordinator, RetryDecision, RetryPolicy};
pub use worker::{ConsumeLoop, RecordHandler};

use crate::config::Config;
use crate::queue::{Consumer, CrawlMessage, Producer};
use crate::storage::ContentStore;
use crate::url::canonical_key;
use std::sync::Arc;

/// Builds the fetch worker described by `config`
pub fn fetch_worker(
    config: &Config,
    producer: Arc<dyn Producer>,
    store: ContentStore,
) -> crate::Result<FetchWorker> {
    let client = build_http_client(&config.fetch)?;
    let retry = RetryCoordinator::new(
        producer.clone(),
        config.queue.fetch_topic.clone(),
        config.queue.dead_letter_topic.clone(),
        RetryPolicy::from(&config.fetch),
    );

    Ok(FetchWorker::new(
        client,
        store,
        producer,
        config.queue.process_topic.clone(),
        retry,
    ))
}

/// Builds the processing worker described by `config`
pub fn process_worker(
    config: &Config,
    producer: Arc<dyn Producer>,
    store: ContentStore,
) -> ProcessWorker {
    ProcessWorker::new(
        store,
        producer,
        config.queue.fetch_topic.clone(),
        config.process.link_buffer,
        AdmissionPolicy::from_flag(config.process.dedup_links_per_page),
    )
}

/// Consume loop over the fetch topic
pub fn fetch_loop(config: &Config, consumer: Arc<dyn Consumer>) -> ConsumeLoop {
    ConsumeLoop::new(
        consumer,
        FETCH_CONSUMER_GROUP,
        config.queue.fetch_topic.clone(),
        config.queue.batch_size,
        config.queue.poll_interval(),
    )
}

/// Consume loop over the process topic
pub fn process_loop(config: &Config, consumer: Arc<dyn Consumer>) -> ConsumeLoop {
    ConsumeLoop::new(
        consumer,
        PROCESS_CONSUMER_GROUP,
        config.queue.process_topic.clone(),
        config.queue.batch_size,
        config.queue.poll_interval(),
    )
}

/// Publishes seed links onto the fetch topic
///
/// Links that do not yield a canonical key are skipped with a warning.
/// Returns the number of links published.
pub async fn seed<I, S>(producer: &dyn Producer, fetch_topic: &str, links: I) -> crate::Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut published = 0;
    for link in links {
        let link = link.as_ref().trim();
        if let Err(e) = canonical_key(link) {
            tracing::warn!("Skipping seed {}: {}", link, e);
            continue;
        }

        producer
            .publish(fetch_topic, &CrawlMessage::new(link).encode()?)
            .await?;
        tracing::info!("Seeded {}", link);
        published += 1;
    }
    Ok(published)
}
