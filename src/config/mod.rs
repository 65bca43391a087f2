//! Configuration module for Site-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with environment overrides for the queue, metadata and blob handles.
//!
//! # Example
//!
//! ```no_run
//! use site_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Dead letters go to: {}", config.queue.dead_letter_topic);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BlobConfig, Config, FetchConfig, MetadataConfig, ProcessConfig, QueueConfig};

// Re-export parser functions
pub use parser::{apply_env_overrides, compute_config_hash, load_config, load_config_with_hash};
