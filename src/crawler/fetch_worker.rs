//! Fetch stage
//!
//! For every message on the fetch topic: derive the canonical key, fetch the
//! link, fingerprint the body and store it if it changed. Changed pages are
//! forwarded to the process topic by key; network failures and not-found
//! responses go to the retry coordinator.

use crate::crawler::fetcher::{fetch_url, FetchResult};
use crate::crawler::hasher::content_hash;
use crate::crawler::retry::RetryCoordinator;
use crate::crawler::worker::RecordHandler;
use crate::queue::{CrawlMessage, Producer, Record};
use crate::state::AttemptState;
use crate::storage::{ContentStore, UpsertOutcome};
use crate::url::{canonical_key, ensure_scheme};
use crate::CrawlError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;

/// Consumer group of the fetch stage
pub const FETCH_CONSUMER_GROUP: &str = "site-fetching-service";

/// What handling one fetch-topic message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Body was new or changed, stored, and the key sent for processing
    Stored { key: String, outcome: UpsertOutcome },
    /// Body matched the stored hash; nothing written or published
    Unchanged { key: String },
    /// Fetch failed transiently and the message was rescheduled
    Retrying { key: String },
    /// Fetch failed transiently with no retries left
    DeadLettered { key: String },
    /// Message could not be understood; dropped without retry
    Dropped { reason: String },
}

/// Tracks one message through its attempt states
#[derive(Debug)]
struct Attempt {
    state: AttemptState,
}

impl Attempt {
    fn new() -> Self {
        Self {
            state: AttemptState::Pending,
        }
    }

    fn advance(&mut self, next: AttemptState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// The fetch worker
pub struct FetchWorker {
    client: Client,
    store: ContentStore,
    producer: Arc<dyn Producer>,
    process_topic: String,
    retry: RetryCoordinator,
}

impl FetchWorker {
    pub fn new(
        client: Client,
        store: ContentStore,
        producer: Arc<dyn Producer>,
        process_topic: impl Into<String>,
        retry: RetryCoordinator,
    ) -> Self {
        Self {
            client,
            store,
            producer,
            process_topic: process_topic.into(),
            retry,
        }
    }

    /// Handles one fetch-topic payload
    ///
    /// Returns `Err` only for store and queue failures, which stop the
    /// worker.
    pub async fn handle_message(&self, payload: &[u8]) -> crate::Result<FetchOutcome> {
        let message = match CrawlMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping unreadable fetch message: {}", e);
                return Ok(FetchOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        let (key, target) = match canonical_key(&message.link)
            .and_then(|key| ensure_scheme(&message.link).map(|target| (key, target)))
        {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Dropping {}: {}", message.link, e);
                return Ok(FetchOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        let mut attempt = Attempt::new();
        attempt.advance(AttemptState::Fetching)?;
        tracing::debug!("Fetching {} (key {}, retry {})", target, key, message.retry_count);

        match fetch_url(&self.client, &target).await {
            FetchResult::Success {
                final_url,
                status_code,
                body,
            } => {
                let hash = content_hash(&body);
                let outcome = self
                    .store
                    .store_if_changed(&key, &body, &hash, Utc::now())
                    .await?;
                attempt.advance(AttemptState::Succeeded)?;

                if !outcome.is_changed() {
                    tracing::info!("{} unchanged ({})", key, hash);
                    return Ok(FetchOutcome::Unchanged { key });
                }

                self.producer
                    .publish(&self.process_topic, key.as_bytes())
                    .await?;
                tracing::info!(
                    "{} {:?}: HTTP {} from {}, {} bytes, hash {}",
                    key,
                    outcome,
                    status_code,
                    final_url,
                    body.len(),
                    hash
                );
                Ok(FetchOutcome::Stored { key, outcome })
            }
            FetchResult::Transient { reason } => {
                let state = self.retry.handle_failure(&message, &reason).await?;
                attempt.advance(state)?;
                if state == AttemptState::DeadLettered {
                    Ok(FetchOutcome::DeadLettered { key })
                } else {
                    Ok(FetchOutcome::Retrying { key })
                }
            }
        }
    }
}

#[async_trait]
impl RecordHandler for FetchWorker {
    async fn handle_record(&self, record: &Record) -> crate::Result<()> {
        self.handle_message(&record.payload).await.map(|_| ())
    }
}
