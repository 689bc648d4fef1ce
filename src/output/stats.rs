//! Run statistics
//!
//! Counters collected per shard traversal and a formatted end-of-run summary.

use crate::state::Termination;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::AddAssign;
use std::path::PathBuf;

/// Outcome counts for the listings of one or more pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Records persisted with their contact block
    pub written: u64,

    /// Records persisted with empty contact fields after a failed detail fetch
    pub partial: u64,

    /// Stubs skipped as structurally incomplete
    pub skipped: u64,

    /// Stubs lost to an unexpected enrichment error
    pub failed: u64,
}

impl DispatchSummary {
    /// Total number of records that reached the sink
    pub fn persisted(&self) -> u64 {
        self.written + self.partial
    }

    /// Total number of stubs accounted for
    pub fn total(&self) -> u64 {
        self.written + self.partial + self.skipped + self.failed
    }
}

impl AddAssign for DispatchSummary {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.partial += other.partial;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Result of one shard (or start-URL) traversal
#[derive(Debug, Clone)]
pub struct ShardReport {
    /// Query/shard pair or start URL this report belongs to
    pub label: String,

    /// Sink the records went to
    pub sink: PathBuf,

    /// Result pages fetched
    pub pages: u32,

    /// Total result hits the site announced on the first page
    pub total_hits: u64,

    /// Listing outcomes
    pub listings: DispatchSummary,

    /// Stubs dropped because their detail reference was already seen in this run
    pub duplicates: u64,

    /// Why the traversal stopped, if it stopped cleanly
    pub termination: Option<Termination>,

    /// Fatal error that aborted the traversal
    pub error: Option<String>,
}

impl ShardReport {
    pub fn new(label: impl Into<String>, sink: PathBuf) -> Self {
        Self {
            label: label.into(),
            sink,
            pages: 0,
            total_hits: 0,
            listings: DispatchSummary::default(),
            duplicates: 0,
            termination: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Whole-run statistics
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub shards: Vec<ShardReport>,
}

impl CrawlStatistics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            shards: Vec::new(),
        }
    }

    pub fn record(&mut self, report: ShardReport) {
        self.shards.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Listing outcomes summed over all shards
    pub fn totals(&self) -> DispatchSummary {
        let mut totals = DispatchSummary::default();
        for shard in &self.shards {
            totals += shard.listings;
        }
        totals
    }

    pub fn total_pages(&self) -> u64 {
        self.shards.iter().map(|s| u64::from(s.pages)).sum()
    }

    /// Number of shards per termination reason
    pub fn terminations(&self) -> HashMap<Termination, u64> {
        let mut counts = HashMap::new();
        for reason in self.shards.iter().filter_map(|s| s.termination) {
            *counts.entry(reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardReport> {
        self.shards.iter().filter(|s| s.is_failed())
    }
}

impl Default for CrawlStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Harvest Statistics ===\n");

    let totals = stats.totals();
    println!("Overview:");
    println!("  Shards: {}", stats.shards.len());
    println!("  Pages fetched: {}", stats.total_pages());
    println!("  Records persisted: {}", totals.persisted());
    println!("    with contact data: {}", totals.written);
    println!("    without contact data: {}", totals.partial);
    println!("  Listings skipped: {}", totals.skipped);
    println!("  Listings failed: {}", totals.failed);
    if let Some(finished) = stats.finished_at {
        let elapsed = finished - stats.started_at;
        println!("  Duration: {}s", elapsed.num_seconds());
    }
    println!();

    let terminations = stats.terminations();
    if !terminations.is_empty() {
        println!("Terminations:");
        let mut counts: Vec<_> = terminations.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        for (reason, count) in counts {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    println!("Shards:");
    for shard in &stats.shards {
        let outcome = match (&shard.error, shard.termination) {
            (Some(error), _) => format!("FAILED: {}", error),
            (None, Some(reason)) => reason.to_string(),
            (None, None) => "unfinished".to_string(),
        };
        println!(
            "  {} -> {} ({} pages, {} records, {} skipped) [{}]",
            shard.label,
            shard.sink.display(),
            shard.pages,
            shard.listings.persisted(),
            shard.listings.skipped,
            outcome
        );
    }

    let cut_short = stats
        .shards
        .iter()
        .filter(|s| s.termination.is_some_and(|t| !t.is_natural()))
        .count();
    if cut_short > 0 {
        println!("\n{} shard(s) stopped before the last result page", cut_short);
    }

    let failed = stats.failed_shards().count();
    if failed > 0 {
        println!("\n{} shard(s) aborted; see log for details", failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(label: &str, written: u64, termination: Termination) -> ShardReport {
        let mut report = ShardReport::new(label, PathBuf::from(format!("data/{}.jsonl", label)));
        report.pages = 2;
        report.listings.written = written;
        report.listings.partial = 1;
        report.termination = Some(termination);
        report
    }

    #[test]
    fn test_dispatch_summary_arithmetic() {
        let mut a = DispatchSummary {
            written: 3,
            partial: 1,
            skipped: 2,
            failed: 1,
        };
        a += DispatchSummary {
            written: 1,
            ..DispatchSummary::default()
        };
        assert_eq!(a.persisted(), 5);
        assert_eq!(a.total(), 8);
    }

    #[test]
    fn test_totals_across_shards() {
        let mut stats = CrawlStatistics::new();
        stats.record(report("a", 4, Termination::Exhausted));
        stats.record(report("b", 6, Termination::Exhausted));
        stats.record(report("c", 0, Termination::FetchFailed));

        assert_eq!(stats.totals().written, 10);
        assert_eq!(stats.totals().partial, 3);
        assert_eq!(stats.total_pages(), 6);
        assert_eq!(stats.terminations()[&Termination::Exhausted], 2);
        assert_eq!(stats.terminations()[&Termination::FetchFailed], 1);
    }

    #[test]
    fn test_failed_shards() {
        let mut stats = CrawlStatistics::new();
        stats.record(report("a", 1, Termination::Exhausted));
        let mut broken = ShardReport::new("b", PathBuf::from("data/b.jsonl"));
        broken.error = Some("disk full".to_string());
        stats.record(broken);

        let failed: Vec<_> = stats.failed_shards().map(|s| s.label.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
    }
}
