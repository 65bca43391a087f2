//! Bounded retry and dead-letter escalation for failed fetches
//!
//! A transiently failed message is re-published to the fetch topic with its
//! retry count incremented, after a fixed delay handled by the queue itself.
//! Once the count would exceed the budget, the bare link goes to the
//! dead-letter topic instead and the message is never retried again.

use crate::config::FetchConfig;
use crate::queue::{CrawlMessage, Producer, QueueResult};
use crate::state::AttemptState;
use std::sync::Arc;
use std::time::Duration;

/// Retry budget and delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// What to do with a message whose fetch just failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-publish `message` to the fetch topic after `delay`
    Retry { message: CrawlMessage, delay: Duration },
    /// Publish `link` to the dead-letter topic and stop
    DeadLetter { link: String },
}

impl RetryPolicy {
    /// Decides the next step for a failed message
    ///
    /// The incremented count is compared with the budget: with the default
    /// budget of 5 a message is retried five times and dead-lettered on its
    /// sixth failure.
    pub fn decide(&self, message: &CrawlMessage) -> RetryDecision {
        let next = message.next_attempt();
        if next.retry_count > self.max_retries {
            RetryDecision::DeadLetter {
                link: message.link.clone(),
            }
        } else {
            RetryDecision::Retry {
                message: next,
                delay: self.delay,
            }
        }
    }
}

/// Executes retry decisions against the queue
#[derive(Clone)]
pub struct RetryCoordinator {
    producer: Arc<dyn Producer>,
    fetch_topic: String,
    dead_letter_topic: String,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(
        producer: Arc<dyn Producer>,
        fetch_topic: impl Into<String>,
        dead_letter_topic: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            producer,
            fetch_topic: fetch_topic.into(),
            dead_letter_topic: dead_letter_topic.into(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Routes a transiently failed message and returns the state it ends in
    ///
    /// Returns [`AttemptState::Retrying`] when the message was scheduled for
    /// another attempt, or [`AttemptState::DeadLettered`] when its budget ran
    /// out. Neither path waits for the retry delay.
    pub async fn handle_failure(
        &self,
        message: &CrawlMessage,
        reason: &str,
    ) -> QueueResult<AttemptState> {
        match self.policy.decide(message) {
            RetryDecision::Retry { message, delay } => {
                tracing::warn!(
                    "Fetch of {} failed ({}); retry {}/{} in {:?}",
                    message.link,
                    reason,
                    message.retry_count,
                    self.policy.max_retries,
                    delay
                );
                self.producer
                    .publish_delayed(&self.fetch_topic, &message.encode()?, delay)
                    .await?;
                Ok(AttemptState::Retrying)
            }
            RetryDecision::DeadLetter { link } => {
                tracing::error!(
                    "Fetch of {} failed ({}) after {} retries; dead-lettering",
                    link,
                    reason,
                    message.retry_count
                );
                self.producer
                    .publish(&self.dead_letter_topic, link.as_bytes())
                    .await?;
                Ok(AttemptState::DeadLettered)
            }
        }
    }
}
