use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that override values from the configuration file
const ENV_FETCH_TOPIC: &str = "FETCH_TOPIC";
const ENV_PROCESS_TOPIC: &str = "PROCESS_TOPIC";
const ENV_DEAD_LETTER_TOPIC: &str = "DEAD_LETTER_TOPIC";
const ENV_QUEUE_DATABASE_PATH: &str = "QUEUE_DATABASE_PATH";
const ENV_METADATA_DATABASE_PATH: &str = "METADATA_DATABASE_PATH";
const ENV_BLOB_ROOT: &str = "BLOB_ROOT";

/// Loads and parses a configuration file from the given path
///
/// Values from the process environment (and a `.env` file, when the binary
/// loaded one) override the file before validation runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Fetch topic: {}", config.queue.fetch_topic);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Applies environment overrides using the given lookup function
///
/// `lookup` maps a variable name to its value; `load_config` passes `std::env::var`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let targets: [(&str, &mut String); 6] = [
        (ENV_FETCH_TOPIC, &mut config.queue.fetch_topic),
        (ENV_PROCESS_TOPIC, &mut config.queue.process_topic),
        (ENV_DEAD_LETTER_TOPIC, &mut config.queue.dead_letter_topic),
        (ENV_QUEUE_DATABASE_PATH, &mut config.queue.database_path),
        (ENV_METADATA_DATABASE_PATH, &mut config.metadata.database_path),
        (ENV_BLOB_ROOT, &mut config.blobs.root),
    ];

    for (name, target) in targets {
        if let Some(value) = lookup(name) {
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::Env {
                    name: name.to_string(),
                    message: "value is empty".to_string(),
                });
            }
            tracing::debug!("Overriding {} from environment", name);
            *target = value.to_string();
        }
    }

    Ok(())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
