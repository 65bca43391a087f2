//! Output module for reporting on the pipeline
//!
//! This module handles loading and printing pipeline statistics for the
//! `stats` command.

pub mod stats;

pub use stats::{load_statistics, print_statistics, PipelineStatistics, TopicStatistics};
