//! Wire format of fetch-topic messages
//!
//! Structured messages are JSON objects with the fields `link` and
//! `retry_count`. A bare URL payload is accepted too and reads as a fresh
//! message with no retries.

use crate::queue::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};

/// Unit of work on the fetch topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlMessage {
    pub link: String,
    #[serde(default)]
    pub retry_count: u32,
}

impl CrawlMessage {
    /// A fresh message for a newly discovered or seeded link
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            retry_count: 0,
        }
    }

    /// Decodes a fetch-topic payload, structured or bare
    pub fn decode(payload: &[u8]) -> QueueResult<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| QueueError::Malformed(format!("payload is not UTF-8: {}", e)))?
            .trim();

        if text.is_empty() {
            return Err(QueueError::Malformed("empty payload".to_string()));
        }

        if text.starts_with('{') {
            let message: CrawlMessage = serde_json::from_str(text)?;
            if message.link.trim().is_empty() {
                return Err(QueueError::Malformed("message has an empty link".to_string()));
            }
            return Ok(message);
        }

        Ok(Self::new(text))
    }

    /// Encodes the message as a structured JSON record
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The same message after one more failed attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            link: self.link.clone(),
            retry_count: self.retry_count.saturating_add(1),
        }
    }
}
