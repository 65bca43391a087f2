//! Statistics gathered from the pipeline's stores
//!
//! This module provides functionality for extracting and displaying
//! pipeline statistics: stored records and the state of every topic.

use crate::config::Config;
use crate::crawler::{FETCH_CONSUMER_GROUP, PROCESS_CONSUMER_GROUP};
use crate::queue::Consumer;
use crate::storage::MetadataStore;

/// Message counts for one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStatistics {
    pub topic: String,
    /// Messages ever appended
    pub messages: u64,
    /// Consumer group reading the topic, if any
    pub group: Option<String>,
    /// Messages the group has not committed yet
    pub backlog: Option<u64>,
}

/// Pipeline statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatistics {
    /// Total number of metadata records
    pub records: u64,

    /// Fetch, process and dead-letter topics, in that order
    pub topics: Vec<TopicStatistics>,
}

impl PipelineStatistics {
    /// Messages that reached the dead-letter topic
    pub fn dead_lettered(&self) -> u64 {
        self.topics.last().map(|t| t.messages).unwrap_or(0)
    }
}

/// Loads statistics from the metadata store and the queue
pub async fn load_statistics(
    config: &Config,
    metadata: &dyn MetadataStore,
    consumer: &dyn Consumer,
) -> crate::Result<PipelineStatistics> {
    let records = metadata.count_records().await?;

    let mut topics = Vec::new();
    for (topic, group) in [
        (&config.queue.fetch_topic, Some(FETCH_CONSUMER_GROUP)),
        (&config.queue.process_topic, Some(PROCESS_CONSUMER_GROUP)),
        (&config.queue.dead_letter_topic, None),
    ] {
        let messages = consumer.topic_len(topic).await?;
        let backlog = match group {
            Some(group) => Some(consumer.backlog(group, topic).await?),
            None => None,
        };
        topics.push(TopicStatistics {
            topic: topic.clone(),
            messages,
            group: group.map(str::to_string),
            backlog,
        });
    }

    Ok(PipelineStatistics { records, topics })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &PipelineStatistics) {
    println!("=== Pipeline Statistics ===\n");

    println!("Metadata:");
    println!("  Site records: {}", stats.records);
    println!();

    println!("Topics:");
    for topic in &stats.topics {
        match (&topic.group, topic.backlog) {
            (Some(group), Some(backlog)) => println!(
                "  {}: {} messages, {} pending for {}",
                topic.topic, topic.messages, backlog, group
            ),
            _ => println!("  {}: {} messages", topic.topic, topic.messages),
        }
    }
    println!();

    println!("Dead-lettered links: {}", stats.dead_lettered());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlobConfig, FetchConfig, MetadataConfig, ProcessConfig, QueueConfig};
    use crate::queue::{MemoryQueue, Producer};
    use crate::storage::{MemoryMetadataStore, SiteRecord};
    use chrono::Utc;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            queue: QueueConfig {
                database_path: "queue.db".to_string(),
                fetch_topic: "fetch".to_string(),
                process_topic: "process".to_string(),
                dead_letter_topic: "dead".to_string(),
                partitions: 1,
                batch_size: 10,
                poll_interval_ms: 100,
            },
            metadata: MetadataConfig {
                database_path: "meta.db".to_string(),
            },
            blobs: BlobConfig {
                root: "blobs".to_string(),
            },
            fetch: FetchConfig::default(),
            process: ProcessConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_load_statistics() {
        let metadata = MemoryMetadataStore::new();
        metadata
            .insert_record(&SiteRecord::new("a.com/", "h", Utc::now()))
            .await
            .unwrap();

        let queue = MemoryQueue::new(1);
        queue.publish("fetch", b"a.com/").await.unwrap();
        queue.publish("fetch", b"b.com/").await.unwrap();
        queue.publish("process", b"a.com/").await.unwrap();
        queue.publish("dead", b"c.com/").await.unwrap();
        queue
            .publish_delayed("fetch", b"d.com/", Duration::from_secs(60))
            .await
            .unwrap();

        let batch = queue.poll(FETCH_CONSUMER_GROUP, "fetch", 1).await.unwrap();
        queue.commit(FETCH_CONSUMER_GROUP, &batch[0]).await.unwrap();

        let stats = load_statistics(&config(), &metadata, &queue).await.unwrap();

        assert_eq!(stats.records, 1);
        assert_eq!(stats.topics[0].messages, 2);
        assert_eq!(stats.topics[0].backlog, Some(1));
        assert_eq!(stats.topics[1].backlog, Some(1));
        assert_eq!(stats.topics[2].backlog, None);
        assert_eq!(stats.dead_lettered(), 1);
    }
}
