//! Crawler coordinator - pagination orchestration
//!
//! This module drives one traversal per shard (or start URL) through the
//! `FetchPage → ParsePage → Dispatch → AdvancePage` state machine:
//! - Fetching and parsing result pages
//! - Handing each page's listings to the worker pool, deduplicated per shard
//! - Following next-page references until a termination condition holds
//! - Enforcing page/record budgets and the stop signal between pages

use crate::config::{Config, CrawlerConfig};
use crate::crawler::enricher::DetailEnricher;
use crate::crawler::fetcher::{Fetcher, RequestProfile};
use crate::crawler::parser::{DirectoryParser, PageParser};
use crate::crawler::pool::WorkerPool;
use crate::crawler::rate_limiter::RateLimiter;
use crate::listing::ListingStub;
use crate::output::{CrawlStatistics, DispatchSummary, OutputWriter, ShardReport, WriteMode};
use crate::state::{CrawlCursor, CrawlState, Termination};
use crate::url::{build_search_url, ensure_absolute, resolve_reference, sink_stem, SearchQuery};
use crate::{HarvestError, UrlResult};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Sink stem used by URL-list mode
const URL_LIST_SINK: &str = "results";

/// Cooperative stop flag, checked before every result-page fetch
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Sets the flag and returns whether a stop had already been requested
    pub fn request_stop(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Main crawler coordinator structure
///
/// Cheap to clone; clones share the HTTP client, parser and stop signal.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn PageParser>,
    profile: Arc<RequestProfile>,
    /// Detail references of query-mode traversals are resolved against this
    site_origin: Url,
    stop: StopSignal,
}

impl Coordinator {
    /// Creates a coordinator with the directory parser and a freshly drawn request profile
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        let profile = RequestProfile::from_config(&config.user_agent);
        tracing::debug!(
            user_agent = profile.user_agent(),
            max_attempts = fetcher.policy().max_attempts,
            "request profile selected"
        );
        Self::with_parts(config, fetcher, Arc::new(DirectoryParser), profile)
    }

    pub fn with_parts(
        config: Config,
        fetcher: Fetcher,
        parser: Arc<dyn PageParser>,
        profile: RequestProfile,
    ) -> Result<Self, HarvestError> {
        let site_origin = ensure_absolute(&config.site.base_url)?;

        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            parser,
            profile: Arc::new(profile),
            site_origin,
            stop: StopSignal::new(),
        })
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// First result page of `query`, optionally restricted to `shard`
    pub fn start_url(&self, query: &SearchQuery, shard: Option<&str>) -> UrlResult<Url> {
        build_search_url(&self.config.site, query, shard)
    }

    /// Crawls `query` once per shard, one shard at a time
    ///
    /// An empty shard list runs a single unsharded traversal. A failing shard is
    /// recorded in the statistics and does not stop the remaining ones.
    pub async fn run_query(&self, query: &SearchQuery, shards: &[String]) -> CrawlStatistics {
        let mut stats = CrawlStatistics::new();

        if shards.is_empty() {
            stats.record(self.run_shard(query, None).await);
        } else {
            tracing::info!("Crawling '{}' across {} shards", query.term, shards.len());
            for shard in shards {
                if self.stop.is_stopped() {
                    tracing::warn!(shard = %shard, "stop requested, not starting shard");
                    break;
                }
                stats.record(self.run_shard(query, Some(shard)).await);
            }
        }

        stats.finish();
        stats
    }

    /// Crawls one shard into its own sink
    pub async fn run_shard(&self, query: &SearchQuery, shard: Option<&str>) -> ShardReport {
        let label = match shard {
            Some(shard) => format!("{} [{}]", query.term, shard),
            None => query.term.clone(),
        };
        let directory = Path::new(&self.config.output.directory);
        let stem = sink_stem(Some(&query.term), shard);
        let mut report = ShardReport::new(label, directory.join(format!("{}.jsonl", stem)));

        let start = match self.start_url(query, shard) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(shard = ?shard, error = %e, "cannot build start URL");
                report.error = Some(e.to_string());
                return report;
            }
        };

        let writer = match OutputWriter::open_in(directory, &stem, self.config.output.mode).await {
            Ok(writer) => Arc::new(writer),
            Err(e) => {
                tracing::error!(sink = %report.sink.display(), error = %e, "cannot open sink");
                report.error = Some(e.to_string());
                return report;
            }
        };

        tracing::info!(shard = ?shard, url = %start, sink = %report.sink.display(), "Starting traversal");
        let origin = self.site_origin.clone();
        self.finish_traversal(start, origin, shard.map(str::to_string), writer, report)
            .await
    }

    /// Crawls every start URL into one shared sink, up to `url-workers` at a time
    pub async fn run_url_list(
        &self,
        urls: Vec<String>,
        mode: WriteMode,
    ) -> Result<CrawlStatistics, HarvestError> {
        let mut stats = CrawlStatistics::new();
        let directory = Path::new(&self.config.output.directory);
        let writer = Arc::new(OutputWriter::open_in(directory, URL_LIST_SINK, mode).await?);
        let permits = Arc::new(Semaphore::new(self.config.crawler.url_workers.max(1) as usize));

        tracing::info!(
            urls = urls.len(),
            url_workers = self.config.crawler.url_workers,
            sink = %writer.path().display(),
            "Crawling URL list"
        );

        let mut join_set = JoinSet::new();
        for raw in urls {
            let coordinator = self.clone();
            let writer = Arc::clone(&writer);
            let permits = Arc::clone(&permits);

            join_set.spawn(async move {
                let mut report = ShardReport::new(raw.clone(), writer.path().to_path_buf());
                let Ok(_permit) = permits.acquire_owned().await else {
                    report.error = Some("worker pool closed".to_string());
                    return report;
                };

                if coordinator.stop.is_stopped() {
                    report.termination = Some(Termination::Cancelled);
                    return report;
                }

                match ensure_absolute(&raw).and_then(|start| {
                    let origin = resolve_reference(&start, "/")?;
                    Ok((start, origin))
                }) {
                    Ok((start, origin)) => {
                        coordinator
                            .finish_traversal(start, origin, None, writer, report)
                            .await
                    }
                    Err(e) => {
                        tracing::error!(url = %raw, error = %e, "skipping invalid start URL");
                        report.error = Some(e.to_string());
                        report
                    }
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => stats.record(report),
                Err(e) => tracing::error!(error = %e, "start URL task aborted"),
            }
        }

        stats.finish();
        Ok(stats)
    }

    async fn finish_traversal(
        &self,
        start: Url,
        origin: Url,
        shard: Option<String>,
        writer: Arc<OutputWriter>,
        mut report: ShardReport,
    ) -> ShardReport {
        match self.traverse(start, origin, shard, writer, &mut report).await {
            Ok(reason) => {
                if reason.is_failure() {
                    tracing::warn!(
                        label = %report.label,
                        termination = %reason,
                        pages = report.pages,
                        records = report.listings.persisted(),
                        "Traversal ended on a page failure"
                    );
                } else {
                    tracing::info!(
                        label = %report.label,
                        termination = %reason,
                        pages = report.pages,
                        records = report.listings.persisted(),
                        skipped = report.listings.skipped,
                        "Traversal finished"
                    );
                }
                report.termination = Some(reason);
            }
            Err(e) => {
                tracing::error!(label = %report.label, error = %e, "Traversal aborted");
                report.error = Some(e.to_string());
            }
        }
        report
    }

    /// Runs the pagination state machine until it terminates
    ///
    /// Page-level failures end the traversal with a [`Termination`]; only sink
    /// failures and state-machine violations surface as `Err`. Detail references
    /// resolve against `origin`, next-page references against the current page.
    async fn traverse(
        &self,
        start: Url,
        origin: Url,
        shard: Option<String>,
        writer: Arc<OutputWriter>,
        report: &mut ShardReport,
    ) -> Result<Termination, HarvestError> {
        let crawler = &self.config.crawler;
        let enricher = Arc::new(DetailEnricher::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.parser),
            Arc::clone(&self.profile),
            origin,
        ));
        let pool = WorkerPool::new(enricher, writer, crawler);
        let page_limiter = RateLimiter::new(Duration::from_millis(crawler.min_interval_ms));

        let mut cursor = CrawlCursor::new(start, shard);
        let mut seen_refs: HashSet<String> = HashSet::new();
        let mut document: Option<String> = None;
        let mut batch: Vec<ListingStub> = Vec::new();
        let mut next_ref: Option<String> = None;

        loop {
            match cursor.state() {
                CrawlState::FetchPage => {
                    if self.stop.is_stopped() {
                        cursor.terminate(Termination::Cancelled)?;
                        continue;
                    }
                    if crawler.max_pages > 0 && report.pages >= crawler.max_pages {
                        cursor.terminate(Termination::PageBudget)?;
                        continue;
                    }

                    page_limiter.wait().await;

                    match self.fetcher.fetch(cursor.current().as_str(), &self.profile).await {
                        Ok(body) => {
                            report.pages += 1;
                            document = Some(body);
                            cursor.transition(CrawlState::ParsePage)?;
                        }
                        Err(e) => {
                            tracing::error!(
                                url = %cursor.current(),
                                page = cursor.page(),
                                status = ?e.status(),
                                exhausted = e.is_exhausted(),
                                error = %e,
                                "result page fetch failed"
                            );
                            cursor.terminate(Termination::FetchFailed)?;
                        }
                    }
                }

                CrawlState::ParsePage => {
                    let body = document.take().unwrap_or_default();

                    if cursor.page() == 1 {
                        report.total_hits = self.parser.parse_total_hits(&body);
                        tracing::info!(total_hits = report.total_hits, "Result count announced");
                    }

                    match self.parser.parse_listing_page(&body) {
                        Err(e) => {
                            tracing::warn!(url = %cursor.current(), page = cursor.page(), error = %e, "treating page as empty");
                            cursor.terminate(Termination::MalformedPage)?;
                        }
                        Ok(page) if page.listings.is_empty() => {
                            report.listings.skipped += page.rejected as u64;
                            tracing::info!(page = cursor.page(), rejected = page.rejected, "no listings on page");
                            cursor.terminate(Termination::NoEntries)?;
                        }
                        Ok(page) => {
                            report.listings.skipped += page.rejected as u64;
                            let found = page.listings.len();
                            batch = dedup_listings(page.listings, &mut seen_refs);
                            let duplicates = (found - batch.len()) as u64;
                            if duplicates > 0 {
                                tracing::debug!(page = cursor.page(), duplicates, "dropped duplicate listings");
                            }
                            report.duplicates += duplicates;
                            next_ref = page.next_page;
                            cursor.transition(CrawlState::Dispatch)?;
                        }
                    }
                }

                CrawlState::Dispatch => {
                    let mut pending = std::mem::take(&mut batch);
                    let mut page_summary = DispatchSummary::default();

                    // With a record budget, dispatch in windows so listings that
                    // end up skipped or failed do not use up the page's share.
                    while !pending.is_empty() && !record_budget_reached(crawler, &report.listings) {
                        let take = match crawler.max_records {
                            0 => pending.len(),
                            max => budget_window(&pending, max - report.listings.persisted()),
                        };
                        let rest = pending.split_off(take);
                        let summary = pool.process(pending).await?;
                        report.listings += summary;
                        page_summary += summary;
                        pending = rest;
                    }

                    tracing::info!(
                        page = cursor.page(),
                        written = page_summary.written,
                        partial = page_summary.partial,
                        skipped = page_summary.skipped,
                        failed = page_summary.failed,
                        "Page dispatched"
                    );

                    if record_budget_reached(crawler, &report.listings) {
                        if !pending.is_empty() {
                            tracing::info!(
                                page = cursor.page(),
                                undispatched = pending.len(),
                                "record budget reached before the end of the page"
                            );
                        }
                        cursor.terminate(Termination::RecordBudget)?;
                    } else {
                        cursor.transition(CrawlState::AdvancePage)?;
                    }
                }

                CrawlState::AdvancePage => match next_ref.take() {
                    None => cursor.terminate(Termination::Exhausted)?,
                    Some(reference) => match resolve_reference(cursor.current(), &reference) {
                        Ok(next) => {
                            cursor.set_next(Some(next));
                            cursor.advance()?;
                        }
                        Err(e) => {
                            tracing::warn!(reference = %reference, error = %e, "unusable next-page reference");
                            cursor.terminate(Termination::InvalidNextPage)?;
                        }
                    },
                },

                CrawlState::Terminated(reason) => return Ok(reason),
            }
        }
    }
}

fn record_budget_reached(crawler: &CrawlerConfig, listings: &DispatchSummary) -> bool {
    crawler.max_records > 0 && listings.persisted() >= crawler.max_records
}

/// Length of the leading slice of `stubs` holding `remaining` persistable listings
///
/// Stubs that will be skipped do not count towards the window. Never 0 for a
/// non-empty slice.
fn budget_window(stubs: &[ListingStub], remaining: u64) -> usize {
    let mut eligible = 0u64;
    for (index, stub) in stubs.iter().enumerate() {
        if stub.skip_reason().is_none() {
            eligible += 1;
            if eligible >= remaining {
                return index + 1;
            }
        }
    }
    stubs.len()
}

/// Drops stubs whose detail reference was already dispatched in this traversal
///
/// Stubs without a reference pass through; the enricher decides what to do with them.
fn dedup_listings(listings: Vec<ListingStub>, seen: &mut HashSet<String>) -> Vec<ListingStub> {
    listings
        .into_iter()
        .filter(|stub| match stub.detail_ref() {
            Some(reference) => seen.insert(reference.to_string()),
            None => true,
        })
        .collect()
}
