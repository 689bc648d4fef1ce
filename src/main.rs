//! Listing-Harvester main entry point
//!
//! This is the command-line interface for the Listing-Harvester directory crawler.

use anyhow::{bail, Context};
use clap::Parser;
use listing_harvester::config::{load_config_with_hash, validate, Config, ConfigOverrides};
use listing_harvester::crawler::{Coordinator, StopSignal};
use listing_harvester::output::{print_statistics, WriteMode};
use listing_harvester::shards::{load_shard_keys, load_start_urls};
use listing_harvester::url::SearchQuery;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Listing-Harvester: a paginated directory crawler
///
/// Walks the result pages of a directory search, optionally once per postal
/// code, enriches every listing with the contact data from its detail page and
/// appends the records to a JSON Lines file per shard.
#[derive(Parser, Debug)]
#[command(name = "listing-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A paginated directory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Search term
    #[arg(short, long, required_unless_present = "url_list")]
    query: Option<String>,

    /// Result offset of the first page
    #[arg(short, long, default_value_t = 0)]
    offset: u32,

    /// Restrict the search to one postal code
    #[arg(short, long, conflicts_with = "postal_codes")]
    postal_code: Option<String>,

    /// Run the search once per postal code listed in FILE
    #[arg(long, value_name = "FILE")]
    postal_codes: Option<PathBuf>,

    /// Concurrent detail-page workers per result page
    #[arg(short, long)]
    workers: Option<u32>,

    /// Crawl the start URLs listed in FILE instead of building a search
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["query", "postal_code", "postal_codes"])]
    url_list: Option<PathBuf>,

    /// Start URLs crawled concurrently in URL-list mode
    #[arg(long)]
    url_workers: Option<u32>,

    /// Truncate existing output files before writing
    #[arg(long, conflicts_with = "append")]
    fresh: bool,

    /// Keep existing output files and append to them
    #[arg(long, conflicts_with = "fresh")]
    append: bool,

    /// Directory the JSON Lines files are written to
    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Stop each shard after N result pages
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Stop each shard after N persisted records
    #[arg(long, value_name = "N")]
    max_records: Option<u64>,

    /// Show the effective configuration and first page URLs without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;

    if cli.dry_run {
        return handle_dry_run(&cli, config);
    }

    let stop = StopSignal::new();
    spawn_interrupt_handler(stop.clone());

    let coordinator = Coordinator::new(config)
        .context("failed to initialize crawler")?
        .with_stop_signal(stop);

    let stats = if let Some(list) = &cli.url_list {
        let urls = load_start_urls(list)
            .with_context(|| format!("failed to read URL list {}", list.display()))?;
        if urls.is_empty() {
            bail!("URL list {} contains no URLs", list.display());
        }
        let mode = if cli.append {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        };
        coordinator.run_url_list(urls, mode).await?
    } else {
        let query = search_query(&cli)?;
        let shards = shard_keys(&cli)?;
        tracing::info!(
            "Starting crawl for '{}' ({} shard(s), {} workers, mode {})",
            query.term,
            shards.len().max(1),
            coordinator.config().crawler.workers,
            coordinator.config().output.mode
        );
        coordinator.run_query(&query, &shards).await
    };

    print_statistics(&stats);

    if coordinator.stop_signal().is_stopped() {
        tracing::warn!("Crawl interrupted; sinks contain every record finished before the stop");
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvester=info,warn"),
            1 => EnvFilter::new("listing_harvester=debug,info"),
            2 => EnvFilter::new("listing_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (or defaults) and applies command-line overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Config::default()
        }
    };

    let mode = if cli.fresh {
        Some(WriteMode::Truncate)
    } else if cli.append {
        Some(WriteMode::Append)
    } else {
        None
    };

    let overrides = ConfigOverrides {
        workers: cli.workers,
        url_workers: cli.url_workers,
        max_pages: cli.max_pages,
        max_records: cli.max_records,
        mode,
        output_directory: cli.output_dir.clone(),
    };

    let config = config.with_overrides(&overrides);
    validate(&config).context("invalid configuration")?;
    Ok(config)
}

fn search_query(cli: &Cli) -> anyhow::Result<SearchQuery> {
    let Some(term) = cli.query.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        bail!("a search query (-q) or a URL list (-u) is required");
    };
    Ok(SearchQuery::new(term).with_offset(cli.offset))
}

fn shard_keys(cli: &Cli) -> anyhow::Result<Vec<String>> {
    if let Some(path) = &cli.postal_codes {
        let keys = load_shard_keys(path)
            .with_context(|| format!("failed to read postal codes {}", path.display()))?;
        if keys.is_empty() {
            bail!("postal code file {} contains no codes", path.display());
        }
        return Ok(keys);
    }
    Ok(cli.postal_code.iter().cloned().collect())
}

/// Sets the stop signal on Ctrl-C; the crawl winds down between pages
///
/// A second Ctrl-C exits immediately. Records already appended stay intact.
fn spawn_interrupt_handler(stop: StopSignal) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl-C handler: {}", e);
                return;
            }
            if stop.request_stop() {
                tracing::error!("Second interrupt received, exiting without draining");
                std::process::exit(130);
            }
            tracing::warn!("Interrupt received, finishing current pages before stopping (Ctrl-C again to force exit)");
        }
    });
}

/// Handles the --dry-run mode: shows the effective configuration and first page URLs
fn handle_dry_run(cli: &Cli, config: Config) -> anyhow::Result<()> {
    println!("=== Listing-Harvester Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Search path: {}", config.site.search_path);

    println!("\nCrawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  URL workers: {}", config.crawler.url_workers);
    println!("  Minimum interval: {}ms", config.crawler.min_interval_ms);
    println!("  Pacing: {:?}", config.crawler.pacing);
    println!("  Max pages per shard: {}", budget(u64::from(config.crawler.max_pages)));
    println!("  Max records per shard: {}", budget(config.crawler.max_records));

    println!("\nFetch:");
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Attempts: {}", config.fetch.max_attempts);
    println!(
        "  Retry delay: {}-{}ms",
        config.fetch.retry_delay_min_ms, config.fetch.retry_delay_max_ms
    );

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Mode: {}", config.output.mode);

    let coordinator = Coordinator::new(config).context("failed to initialize crawler")?;

    if let Some(list) = &cli.url_list {
        let urls = load_start_urls(list)
            .with_context(|| format!("failed to read URL list {}", list.display()))?;
        println!("\nStart URLs ({}):", urls.len());
        for url in &urls {
            println!("  - {}", url);
        }
    } else {
        let query = search_query(cli)?;
        let shards = shard_keys(cli)?;
        println!("\nFirst pages:");
        if shards.is_empty() {
            println!("  - {}", coordinator.start_url(&query, None)?);
        }
        for shard in &shards {
            println!("  - [{}] {}", shard, coordinator.start_url(&query, Some(shard))?);
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

fn budget(limit: u64) -> String {
    if limit == 0 {
        "unbounded".to_string()
    } else {
        limit.to_string()
    }
}
