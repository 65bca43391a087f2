use crate::config::types::{BlobConfig, Config, FetchConfig, MetadataConfig, ProcessConfig, QueueConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_queue_config(&config.queue)?;
    validate_metadata_config(&config.metadata)?;
    validate_blob_config(&config.blobs)?;
    validate_fetch_config(&config.fetch)?;
    validate_process_config(&config.process)?;
    Ok(())
}

/// Validates queue configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "queue database_path cannot be empty".to_string(),
        ));
    }

    let topics = [
        ("fetch_topic", &config.fetch_topic),
        ("process_topic", &config.process_topic),
        ("dead_letter_topic", &config.dead_letter_topic),
    ];

    for (name, topic) in &topics {
        validate_topic_name(name, topic)?;
    }

    // Every channel must be distinct, otherwise the stages would consume each other's messages
    for i in 0..topics.len() {
        for j in (i + 1)..topics.len() {
            if topics[i].1 == topics[j].1 {
                return Err(ConfigError::Validation(format!(
                    "{} and {} must differ, both are '{}'",
                    topics[i].0, topics[j].0, topics[i].1
                )));
            }
        }
    }

    if config.partitions < 1 {
        return Err(ConfigError::Validation(
            "partitions must be >= 1, got 0".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1, got 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates a topic name: non-empty, alphanumeric plus '-', '_' and '.'
fn validate_topic_name(field: &str, topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }

    if !topic
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "{} must contain only alphanumeric characters, '-', '_' or '.', got '{}'",
            field, topic
        )));
    }

    Ok(())
}

fn validate_metadata_config(config: &MetadataConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "metadata database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_blob_config(config: &BlobConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation(
            "blob root cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs > config.request_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs ({}) cannot exceed request_timeout_secs ({})",
            config.connect_timeout_secs, config.request_timeout_secs
        )));
    }

    Ok(())
}

fn validate_process_config(config: &ProcessConfig) -> Result<(), ConfigError> {
    if config.link_buffer < 1 {
        return Err(ConfigError::Validation(
            "link_buffer must be >= 1, got 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_config() -> QueueConfig {
        QueueConfig {
            database_path: "./queue.db".to_string(),
            fetch_topic: "fetch".to_string(),
            process_topic: "process".to_string(),
            dead_letter_topic: "dlq".to_string(),
            partitions: 2,
            batch_size: 10,
            poll_interval_ms: 100,
        }
    }

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("t", "site-fetch").is_ok());
        assert!(validate_topic_name("t", "site_fetch.v2").is_ok());

        assert!(validate_topic_name("t", "").is_err());
        assert!(validate_topic_name("t", "has space").is_err());
        assert!(validate_topic_name("t", "slash/topic").is_err());
    }

    #[test]
    fn test_valid_queue_config() {
        assert!(validate_queue_config(&queue_config()).is_ok());
    }

    #[test]
    fn test_duplicate_topics_rejected() {
        let mut config = queue_config();
        config.dead_letter_topic = config.fetch_topic.clone();
        assert!(matches!(
            validate_queue_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let mut config = queue_config();
        config.partitions = 0;
        assert!(validate_queue_config(&config).is_err());
    }

    #[test]
    fn test_connect_timeout_bound() {
        let mut config = FetchConfig::default();
        assert!(validate_fetch_config(&config).is_ok());

        config.connect_timeout_secs = config.request_timeout_secs + 1;
        assert!(validate_fetch_config(&config).is_err());
    }

    #[test]
    fn test_zero_link_buffer_rejected() {
        let config = ProcessConfig {
            link_buffer: 0,
            dedup_links_per_page: false,
        };
        assert!(validate_process_config(&config).is_err());
    }
}
