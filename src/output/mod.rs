//! Output module for persisting records and reporting runs
//!
//! This module handles:
//! - The crash-safe JSON Lines sink shared by all workers of a crawl target
//! - Per-shard and whole-run statistics

pub mod stats;
mod writer;

pub use stats::{print_statistics, CrawlStatistics, DispatchSummary, ShardReport};
pub use writer::{OutputError, OutputResult, OutputWriter, WriteMode};
