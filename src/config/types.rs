use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Site-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub queue: QueueConfig,
    pub metadata: MetadataConfig,
    pub blobs: BlobConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

/// Message queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite database backing the queue
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Topic carrying URLs to fetch (the frontier)
    #[serde(rename = "fetch-topic", default = "default_fetch_topic")]
    pub fetch_topic: String,

    /// Topic carrying canonical keys ready for processing
    #[serde(rename = "process-topic", default = "default_process_topic")]
    pub process_topic: String,

    /// Terminal topic for URLs that exhausted their retries
    #[serde(rename = "dead-letter-topic", default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,

    /// Number of partitions per topic
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Maximum number of messages pulled per poll
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// How long an idle consumer waits before polling again (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Path to the SQLite database holding site records
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Blob store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// Root directory under which page bodies are stored
    pub root: String,
}

/// Fetch stage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Retries allowed before a URL is dead-lettered
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before a failed URL is re-offered to the fetch topic (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Processing stage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    /// Capacity of the channel between the HTML scanner and the link publisher
    #[serde(rename = "link-buffer", default = "default_link_buffer")]
    pub link_buffer: usize,

    /// Suppress links already enqueued from the same page
    #[serde(rename = "dedup-links-per-page", default)]
    pub dedup_links_per_page: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            link_buffer: default_link_buffer(),
            dedup_links_per_page: false,
        }
    }
}

fn default_fetch_topic() -> String {
    "site-fetch".to_string()
}

fn default_process_topic() -> String {
    "site-process".to_string()
}

fn default_dead_letter_topic() -> String {
    "site-fetch-dlq".to_string()
}

fn default_partitions() -> u32 {
    4
}

fn default_batch_size() -> usize {
    32
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!("site-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_link_buffer() -> usize {
    64
}
