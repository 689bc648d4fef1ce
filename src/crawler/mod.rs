//! Crawler module for result-page traversal and listing enrichment
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with bounded retry
//! - Result/detail page parsing
//! - Request pacing and the per-page worker pool
//! - Overall traversal coordination

mod coordinator;
mod enricher;
mod fetcher;
mod parser;
mod pool;
mod rate_limiter;

pub use coordinator::{Coordinator, StopSignal};
pub use enricher::{DetailEnricher, EnrichError, EnrichOutcome};
pub use fetcher::{build_http_client, FetchError, Fetcher, RequestProfile, RetryPolicy, RetryState};
pub use parser::{DirectoryParser, ListingPage, PageParser, ParseError};
pub use pool::WorkerPool;
pub use rate_limiter::RateLimiter;

use crate::config::Config;
use crate::output::CrawlStatistics;
use crate::url::SearchQuery;
use crate::HarvestError;

/// Crawls `query` across `shards` with the default parser
///
/// This is the main entry point for a query run. It will:
/// 1. Build the HTTP client and draw the request profile
/// 2. Traverse each shard's result pages in turn
/// 3. Enrich and persist every listing into the shard's sink
/// 4. Return per-shard statistics
pub async fn crawl(
    config: Config,
    query: &SearchQuery,
    shards: &[String],
) -> Result<CrawlStatistics, HarvestError> {
    let coordinator = Coordinator::new(config)?;
    Ok(coordinator.run_query(query, shards).await)
}
